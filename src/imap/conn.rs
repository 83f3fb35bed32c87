use async_imap::Session;
use tokio::net::TcpStream;
use tokio_native_tls::native_tls::TlsConnector;

use crate::error::CoreError;

pub type ImapSession = Session<tokio_native_tls::TlsStream<TcpStream>>;

/// TLS connect + LOGIN. Port 993 implicit TLS only; STARTTLS upgrade is
/// out of scope for the accounts this system manages.
pub async fn connect(
    host: &str,
    port: u16,
    user: &str,
    pass: &str,
) -> Result<ImapSession, CoreError> {
    let tcp = TcpStream::connect((host, port))
        .await
        .map_err(|e| CoreError::Transport(format!("imap tcp connect {host}:{port}: {e}")))?;
    let tls = TlsConnector::builder()
        .build()
        .map_err(|e| CoreError::Transport(format!("tls setup: {e}")))?;
    let tls = tokio_native_tls::TlsConnector::from(tls);
    let tls_stream = tls
        .connect(host, tcp)
        .await
        .map_err(|e| CoreError::Transport(format!("tls handshake {host}: {e}")))?;

    let client = async_imap::Client::new(tls_stream);
    let session = client
        .login(user, pass)
        .await
        .map_err(|e| CoreError::Transport(format!("imap login {user}: {:?}", e.0)))?;
    Ok(session)
}

pub async fn supports_idle(session: &mut ImapSession) -> Result<bool, CoreError> {
    let caps = session
        .capabilities()
        .await
        .map_err(|e| CoreError::Transport(format!("capability query: {e}")))?;
    Ok(caps.has_str("IDLE"))
}
