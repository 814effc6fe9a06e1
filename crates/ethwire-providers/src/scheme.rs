//! URL scheme to transport mapping.

use ethwire_core::error::TransportError;

/// Wire transport selected for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    WebSocket,
}

/// Infer the transport from the scheme of `url`.
pub fn transport_for(url: &str) -> Result<Transport, TransportError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| TransportError::Config(format!("malformed URL {url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(Transport::Http),
        "ws" | "wss" => Ok(Transport::WebSocket),
        other => {
            tracing::debug!(url, scheme = other, "no transport for scheme");
            Err(TransportError::Config(format!(
                "unsupported URL scheme {other:?}, expected http(s) or ws(s)"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemes() {
        assert_eq!(transport_for("http://127.0.0.1:8545").unwrap(), Transport::Http);
        assert_eq!(transport_for("https://node.example/rpc").unwrap(), Transport::Http);
        assert_eq!(transport_for("ws://127.0.0.1:8546").unwrap(), Transport::WebSocket);
        assert_eq!(transport_for("WSS://node.example/ws").unwrap(), Transport::WebSocket);
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(matches!(
            transport_for("ipc:///tmp/geth.ipc"),
            Err(TransportError::Config(_))
        ));
        assert!(matches!(transport_for("127.0.0.1:8545"), Err(TransportError::Config(_))));
        assert!(matches!(transport_for(""), Err(TransportError::Config(_))));
    }
}
