//! Path resolution helpers for build state and logs.

use std::path::{Path, PathBuf};

use url::Url;

/// Environment variable overriding the build directory.
pub const BUILD_DIR_ENV: &str = "CONNECT_CONTENT_BUILD_DIR";

/// Default build directory name, relative to the working directory.
pub const DEFAULT_BUILD_DIR: &str = "rsconnect-build";

/// Reduce a server URL to a filesystem-safe key: `host[:port]` with `.` and
/// `:` replaced by `_`.
///
/// Unparseable input is normalized as-is so the tool still gets a stable key.
pub fn normalize_server_url(server_url: &str) -> String {
    let netloc = match Url::parse(server_url) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => server_url.to_string(),
        },
        Err(_) => server_url.to_string(),
    };
    netloc.replace(['.', ':', '/'], "_")
}

/// `<build_dir>/<normalized-server>.json`
pub fn state_file_path(build_dir: &Path, server_url: &str) -> PathBuf {
    build_dir.join(format!("{}.json", normalize_server_url(server_url)))
}

/// `<build_dir>/logs/<normalized-server>`
pub fn logs_root(build_dir: &Path, server_url: &str) -> PathBuf {
    build_dir.join("logs").join(normalize_server_url(server_url))
}
