use url::Url;

use crate::error::ChannelError;

/// Path the execution server mounts its Socket.IO endpoint on.
pub const SOCKET_PATH: &str = "socket.io/";
/// Engine.IO protocol revision spoken by [`crate::Channel`].
pub const ENGINE_IO_VERSION: &str = "4";

/// Builds the WebSocket endpoint for a server base URL.
///
/// `http`/`https` map to `ws`/`wss`, the Socket.IO path is appended unless
/// already present, and the Engine.IO query parameters are set. Unrelated
/// query parameters are kept.
pub fn socket_endpoint(server_url: &str) -> Result<Url, ChannelError> {
    let mut url = Url::parse(server_url.trim()).map_err(|source| ChannelError::InvalidUrl {
        url: server_url.to_string(),
        source,
    })?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ChannelError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| ChannelError::UnsupportedScheme(url.scheme().to_string()))?;

    let path = url.path().trim_end_matches('/').to_string();
    if !path.ends_with(SOCKET_PATH.trim_end_matches('/')) {
        url.set_path(&format!("{path}/{SOCKET_PATH}"));
    } else {
        url.set_path(&format!("{path}/"));
    }

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "EIO" && key != "transport")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("EIO", ENGINE_IO_VERSION)
        .append_pair("transport", "websocket");

    Ok(url)
}
