//! Opening authenticated sessions

use crate::error::{Error, Result};
use crate::session::SshSession;
use actiongraph::{Connector, Credential, Session};
use ssh2::{CheckResult, KnownHostFileKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Port used when the host carries none
pub const DEFAULT_PORT: u16 = 22;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const KEEPALIVE_SECONDS: u32 = 30;

/// Opens libssh2 sessions from deploy credentials
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
    /// `None` disables host key checking
    known_hosts: Option<PathBuf>,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            known_hosts: default_known_hosts(),
        }
    }
}

/// `~/.ssh/known_hosts`
pub fn default_known_hosts() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts"))
}

impl SshConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deadline for the TCP connect
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// known_hosts file to check host keys against, `None` to skip the check
    pub fn known_hosts(mut self, path: Option<PathBuf>) -> Self {
        self.known_hosts = path;
        self
    }

    fn open(&self, credential: &Credential) -> Result<SshSession> {
        let (host, port) = split_host_port(credential.host())?;
        let address = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| Error::Resolve {
                host: host.clone(),
                source: Some(e),
            })?
            .next()
            .ok_or_else(|| Error::Resolve {
                host: host.clone(),
                source: None,
            })?;

        log::debug!("Connecting to {address} as {}", credential.username());
        let tcp = TcpStream::connect_timeout(&address, self.connect_timeout).map_err(|e| {
            Error::Connect {
                address: address.to_string(),
                source: e,
            }
        })?;

        let mut session = ssh2::Session::new().map_err(Error::ssh("create session"))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(Error::ssh("handshake"))?;

        match &self.known_hosts {
            Some(path) => verify_host_key(&session, &host, port, path)?,
            None => log::warn!("Skipping host key verification for {host}"),
        }

        authenticate(&session, credential)?;
        session.set_keepalive(true, KEEPALIVE_SECONDS);
        session.set_blocking(false);

        Ok(SshSession::new(
            session,
            format!("{}@{host}:{port}", credential.username()),
        ))
    }
}

impl Connector for SshConnector {
    fn connect(&self, credential: &Credential) -> actiongraph::Result<Arc<dyn Session>> {
        let session: Arc<dyn Session> = Arc::new(self.open(credential)?);
        Ok(session)
    }
}

/// Split `host`, `host:port` or `[v6]:port`
///
/// A bare IPv6 address (more than one colon, no brackets) is taken whole.
pub fn split_host_port(value: &str) -> Result<(String, u16)> {
    let invalid = || Error::InvalidHost(value.to_string());

    if let Some(rest) = value.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        let port = match tail {
            "" => DEFAULT_PORT,
            _ => tail
                .strip_prefix(':')
                .and_then(|port| port.parse().ok())
                .ok_or_else(invalid)?,
        };
        return Ok((host.to_string(), port));
    }

    match value.split_once(':') {
        Some((host, port)) if !port.contains(':') => {
            let port = port.parse().map_err(|_| invalid())?;
            if host.is_empty() {
                return Err(invalid());
            }
            Ok((host.to_string(), port))
        }
        _ => Ok((value.to_string(), DEFAULT_PORT)),
    }
}

fn verify_host_key(
    session: &ssh2::Session,
    host: &str,
    port: u16,
    path: &std::path::Path,
) -> Result<()> {
    let unknown = || Error::UnknownHostKey {
        host: host.to_string(),
        known_hosts: path.to_path_buf(),
    };
    if !path.exists() {
        return Err(unknown());
    }

    let mut known_hosts = session.known_hosts().map_err(Error::ssh("load known_hosts"))?;
    known_hosts
        .read_file(path, KnownHostFileKind::OpenSSH)
        .map_err(Error::ssh("read known_hosts"))?;
    let (key, _) = session.host_key().ok_or_else(unknown)?;

    match known_hosts.check_port(host, port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound | CheckResult::Failure => Err(unknown()),
        CheckResult::Mismatch => Err(Error::HostKeyMismatch {
            host: host.to_string(),
            known_hosts: path.to_path_buf(),
        }),
    }
}

fn authenticate(session: &ssh2::Session, credential: &Credential) -> Result<()> {
    let result = match credential {
        Credential::Key {
            username,
            key_file,
            passphrase,
            ..
        } => session.userauth_pubkey_file(username, None, key_file, passphrase.as_deref()),
        Credential::Password {
            username, password, ..
        } => session.userauth_password(username, password),
        Credential::Agent { username, .. } => session.userauth_agent(username),
    };

    let rejected = || Error::AuthRejected {
        method: credential.kind(),
        username: credential.username().to_string(),
    };
    if let Err(e) = result {
        log::debug!("{} authentication failed: {e}", credential.kind());
        return Err(rejected());
    }
    if !session.authenticated() {
        return Err(rejected());
    }
    Ok(())
}
