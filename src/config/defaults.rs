//! Default values for configuration

/// Default directory holding indexed zipballs, relative to the base dir
pub fn default_content_dir() -> String {
    "zipballs".to_string()
}

/// Default directory where new downloads land
pub fn default_spool_dir() -> String {
    std::env::var("LIBRARIAN_SPOOL_DIR").unwrap_or_else(|_| "spool".to_string())
}

/// Default directory for cached cover images
pub fn default_covers_dir() -> String {
    "covers".to_string()
}

/// Default name of the metadata file inside a zipball
pub fn default_metadata_filename() -> String {
    "info.json".to_string()
}

/// Default ordering for search results (most recently updated, then most viewed)
pub fn default_search_order() -> Vec<String> {
    vec!["-date(updated)".to_string(), "-views".to_string()]
}

/// Default number of records per page
pub fn default_page_size() -> u32 {
    20
}

/// Default free space to keep on the content volume (500 MiB)
pub fn default_min_free_bytes() -> u64 {
    500 * 1024 * 1024
}

/// Default root URL the appliance is served from
pub fn default_root_url() -> String {
    "http://librarian.outernet/".to_string()
}

/// Default address range of access-point clients
pub fn default_client_ip_range() -> (String, String) {
    ("10.0.0.1".to_string(), "10.0.0.255".to_string())
}
