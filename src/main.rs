//! librarian CLI entry point

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use librarian::{
    archive::Archive,
    cleanup::FsSpaceProbe,
    commands::{
        cmd_add_downloads, cmd_cleanup_check, cmd_cleanup_delete, cmd_cleanup_list,
        cmd_delete_downloads, cmd_init, cmd_list, cmd_list_downloads, cmd_reload, cmd_resolve,
        cmd_search, cmd_show, cmd_status, cmd_tag_add, cmd_tag_cloud, cmd_tag_remove, cmd_view,
        print_add_report, print_cleanup_listing, print_cleanup_report, print_content_details,
        print_content_page, print_content_tags, print_download_listing, print_status,
        print_tag_cloud, BrowseOptions, InitOptions,
    },
    config::Config,
    downloads::NoDecryptor,
    error::{Error, Result},
    progress::LogWriterFactory,
};
use serde::Serialize;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "librarian")]
#[command(version, about = "Index, browse and clean up a local content library", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "LIBRARIAN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize librarian configuration, directories and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// List content, most recently updated first
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Search content titles
    Search {
        /// Words to look for in titles
        terms: String,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show details of one piece of content
    Show {
        /// Content md5
        md5: String,
    },

    /// Open content, counting a view
    View {
        /// Content md5
        md5: String,
    },

    /// Show the tag cloud
    Tags,

    /// Add or remove tags on content
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },

    /// Manage spooled downloads
    Downloads {
        #[command(subcommand)]
        action: DownloadsAction,
    },

    /// Free disk space by removing content
    Cleanup {
        #[command(subcommand)]
        action: CleanupAction,
    },

    /// Rebuild the index from the content directory
    Reload,

    /// Show library status
    Status,

    /// Show where a client request for a content domain is redirected
    Resolve {
        /// Client IP address
        client: IpAddr,

        /// Requested host name
        host: String,

        /// Requested path
        #[arg(default_value = "/")]
        path: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Only content carrying this tag
    #[arg(long)]
    tag: Option<String>,

    /// Only content in this language
    #[arg(long)]
    lang: Option<String>,

    /// Only multi-page content
    #[arg(long, conflicts_with = "single_page")]
    multipage: bool,

    /// Only single-page content
    #[arg(long)]
    single_page: bool,

    /// Page number
    #[arg(short, long, default_value = "1")]
    page: u32,

    /// Items per page (defaults to archive.page_size)
    #[arg(long)]
    per_page: Option<u32>,
}

impl From<FilterArgs> for BrowseOptions {
    fn from(args: FilterArgs) -> Self {
        let multipage = match (args.multipage, args.single_page) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        BrowseOptions {
            tag: args.tag,
            lang: args.lang,
            multipage,
            page: args.page,
            per_page: args.per_page,
        }
    }
}

#[derive(Subcommand)]
enum TagAction {
    /// Tag content
    Add {
        /// Content md5
        md5: String,
        /// Comma-separated tag names
        tags: String,
    },

    /// Remove tags from content
    Remove {
        /// Content md5
        md5: String,
        /// Comma-separated tag names
        tags: String,
    },
}

#[derive(Subcommand)]
enum DownloadsAction {
    /// List downloads waiting in the spool
    List,

    /// Add downloads to the library
    Add {
        /// Download md5s
        #[arg(required = true)]
        md5s: Vec<String>,
    },

    /// Delete downloads from the spool
    Delete {
        /// Download md5s
        #[arg(required = true)]
        md5s: Vec<String>,
    },
}

#[derive(Subcommand)]
enum CleanupAction {
    /// List content that can be removed
    List,

    /// Show how much space removing the selection would free
    Check {
        /// Content md5s
        md5s: Vec<String>,
    },

    /// Remove the selected content
    Delete {
        /// Content md5s
        md5s: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if e.is_fatal() {
            error!("Fatal: {}", e);
            std::process::exit(2);
        }
        error!("{}", e);
        std::process::exit(1);
    }
}

fn emit<T: Serialize>(json: bool, value: &T, print: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory))
        .with(filter)
        .init();

    if let Commands::Init { force } = cli.command {
        return handle_init(cli.config, force).await;
    }

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "librarian", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let archive = Archive::connect(&config).await?;
    let json = cli.json;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::List { filter } => {
            let page = cmd_list(&config, &archive, &filter.into()).await?;
            emit(json, &page, print_content_page)?;
        }

        Commands::Search { terms, filter } => {
            let page = cmd_search(&config, &archive, &terms, &filter.into()).await?;
            emit(json, &page, print_content_page)?;
        }

        Commands::Show { md5 } => {
            let details = cmd_show(&config, &archive, &md5).await?;
            emit(json, &details, print_content_details)?;
        }

        Commands::View { md5 } => {
            let details = cmd_view(&config, &archive, &md5).await?;
            emit(json, &details, print_content_details)?;
        }

        Commands::Tags => {
            let cloud = cmd_tag_cloud(&archive).await?;
            emit(json, &cloud, |c| print_tag_cloud(c))?;
        }

        Commands::Tag { action } => {
            let tags = match action {
                TagAction::Add { md5, tags } => cmd_tag_add(&config, &archive, &md5, &tags).await?,
                TagAction::Remove { md5, tags } => {
                    cmd_tag_remove(&config, &archive, &md5, &tags).await?
                }
            };
            emit(json, &tags, print_content_tags)?;
        }

        Commands::Downloads { action } => match action {
            DownloadsAction::List => {
                let listing = cmd_list_downloads(&config, &NoDecryptor).await?;
                emit(json, &listing, print_download_listing)?;
            }
            DownloadsAction::Add { md5s } => {
                let report = cmd_add_downloads(&config, &archive, &md5s).await?;
                emit(json, &report, print_add_report)?;
            }
            DownloadsAction::Delete { md5s } => {
                let removed = cmd_delete_downloads(&config, &md5s).await?;
                emit(json, &removed, |n| println!("✓ Removed {} download(s)", n))?;
            }
        },

        Commands::Cleanup { action } => match action {
            CleanupAction::List => {
                let listing = cmd_cleanup_list(&config, &archive, &FsSpaceProbe).await?;
                emit(json, &listing, print_cleanup_listing)?;
            }
            CleanupAction::Check { md5s } => {
                let report = cmd_cleanup_check(&config, &archive, &FsSpaceProbe, &md5s).await?;
                emit(json, &report, print_cleanup_report)?;
            }
            CleanupAction::Delete { md5s } => {
                let report = cmd_cleanup_delete(&config, &archive, &FsSpaceProbe, &md5s).await?;
                emit(json, &report, print_cleanup_report)?;
            }
        },

        Commands::Reload => {
            let rows = cmd_reload(&config, &archive).await?;
            emit(json, &rows, |n| println!("✓ Reloaded {} item(s)", n))?;
        }

        Commands::Status => {
            let status = cmd_status(&config, &archive, &FsSpaceProbe).await?;
            emit(json, &status, print_status)?;
        }

        Commands::Resolve { client, host, path } => {
            let target = cmd_resolve(&config, &archive, client, &host, &path).await?;
            emit(json, &target, |t| match t {
                Some(url) => println!("→ {}", url),
                None => println!("Served normally (no redirect)"),
            })?;
        }
    }

    Ok(())
}

/// Base directory and config file for `--config`, which may name a file or a directory
fn config_location(path: Option<PathBuf>) -> (PathBuf, PathBuf) {
    match path {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        }
        Some(dir) => (dir.clone(), dir.join("config.toml")),
        None => {
            let base = Config::default_base_dir();
            (base.clone(), base.join("config.toml"))
        }
    }
}

async fn handle_init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let (base_dir, config_path) = config_location(path);

    let config = cmd_init(InitOptions {
        base_dir,
        config_path,
        force,
    })
    .await?;

    println!("✓ librarian initialized successfully");
    println!("  Config: {}", config.paths.config_file.display());
    println!("  Content: {}", config.content_dir().display());
    println!("  Spool: {}", config.spool_dir().display());
    println!("\nNext steps:");
    println!("  1. Edit the config file to customize settings");
    println!("  2. Drop downloaded zipballs into the spool directory");
    println!("  3. Add them: librarian downloads add <md5>...");

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let (_, config_path) = config_location(path.map(PathBuf::from));

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
