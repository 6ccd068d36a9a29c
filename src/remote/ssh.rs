//! SSH remote backed by libssh2

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ssh2::{ExtendedData, HashType, Session};
use tracing::{debug, info, warn};

use super::{Remote, RemoteTarget, SshAuth};

/// Mode used for uploads when the local file mode can't be read
const DEFAULT_UPLOAD_MODE: i32 = 0o644;

/// Live SSH session to one target.
///
/// The session is disconnected on drop, so every exit path of a run
/// releases the connection.
pub struct SshRemote {
    session: Session,
    target: RemoteTarget,
}

impl SshRemote {
    /// Open a TCP connection, handshake and authenticate
    pub fn connect(target: &RemoteTarget) -> Result<Self> {
        let tcp = TcpStream::connect((target.host.as_str(), target.port))
            .with_context(|| format!("Failed to connect to {}:{}", target.host, target.port))?;

        let mut session = Session::new().context("Failed to create SSH session")?;
        session.set_tcp_stream(tcp);
        session.handshake().context("SSH handshake failed")?;
        check_host_key(&session, target)?;

        match &target.auth {
            SshAuth::Agent => {
                session
                    .userauth_agent(&target.user)
                    .context("SSH agent authentication failed")?;
            }
            SshAuth::KeyFile { path, passphrase } => {
                session
                    .userauth_pubkey_file(&target.user, None, path, passphrase.as_deref())
                    .with_context(|| {
                        format!("SSH keyfile authentication failed (path={})", path.display())
                    })?;
            }
            SshAuth::Password { password } => {
                session
                    .userauth_password(&target.user, password)
                    .context("SSH password authentication failed")?;
            }
        }

        if !session.authenticated() {
            bail!("SSH authentication did not succeed.");
        }

        info!(remote = %target, "Connected");
        Ok(Self {
            session,
            target: target.clone(),
        })
    }
}

impl Remote for SshRemote {
    fn run_command(&mut self, command: &str) -> Result<i32> {
        let mut channel = self
            .session
            .channel_session()
            .context("Failed to open SSH channel")?;
        // stderr interleaved with stdout, in the order the remote wrote it
        channel
            .handle_extended_data(ExtendedData::Merge)
            .context("Failed to merge remote stderr")?;
        channel
            .exec(command)
            .with_context(|| format!("Failed to exec remote command: {command}"))?;

        {
            let stdout = std::io::stdout();
            let mut reader = BufReader::new(&mut channel);
            let mut line = Vec::new();
            loop {
                line.clear();
                let n = reader
                    .read_until(b'\n', &mut line)
                    .context("Failed to read remote output")?;
                if n == 0 {
                    break;
                }
                let mut out = stdout.lock();
                out.write_all(&line).ok();
                out.flush().ok();
            }
        }

        channel.wait_close().context("Failed to close SSH channel")?;
        let status = channel.exit_status().context("No exit status from remote")?;
        let signal = channel
            .exit_signal()
            .context("Failed to read remote exit signal")?
            .exit_signal;
        let status = exit_code(status, signal.as_deref())?;
        debug!(status, "Remote command finished");
        Ok(status)
    }

    fn upload_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        let bytes =
            fs::read(local).with_context(|| format!("Failed to read {}", local.display()))?;
        let mode = local_mode(local);

        let mut channel = self
            .session
            .scp_send(Path::new(remote), mode, bytes.len() as u64, None)
            .with_context(|| format!("Failed to SCP send to {remote}"))?;
        channel.write_all(&bytes).context("Failed to write SCP bytes")?;
        channel.send_eof().context("Failed to send SCP EOF")?;
        channel
            .wait_eof()
            .with_context(|| format!("Remote scp did not acknowledge {remote}"))?;
        channel.close().context("Failed to close SCP channel")?;
        channel
            .wait_close()
            .context("Failed to wait for SCP channel close")?;

        debug!(local = %local.display(), remote, size = bytes.len(), "Uploaded");
        Ok(())
    }

    fn workdir(&self) -> Option<&str> {
        self.target.workdir.as_deref()
    }
}

impl Drop for SshRemote {
    fn drop(&mut self) {
        // nothing useful to do if the peer is already gone
        let _ = self.session.disconnect(None, "mcdeploy done", None);
        debug!(remote = %self.target, "Disconnected");
    }
}

/// Log the server's host key fingerprint and enforce the pinned one, if any
fn check_host_key(session: &Session, target: &RemoteTarget) -> Result<()> {
    let hash = session
        .host_key_hash(HashType::Sha256)
        .context("Server sent no host key")?;
    let actual = fingerprint(hash);
    info!(remote = %target, fingerprint = %actual, "Host key");

    match &target.host_key_sha256 {
        Some(expected) if !fingerprint_matches(expected, hash) => bail!(
            "Host key mismatch for {}: expected SHA256 {}, server sent {}",
            target.host,
            expected,
            actual
        ),
        Some(_) => Ok(()),
        None => {
            warn!(remote = %target, "No host_key_sha256 pinned, host key not verified");
            Ok(())
        }
    }
}

/// Colon-separated lowercase hex, e.g. `3f:a0:...`
fn fingerprint(hash: &[u8]) -> String {
    hash.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Compare a configured fingerprint (hex, colons and case ignored) to `hash`
fn fingerprint_matches(expected: &str, hash: &[u8]) -> bool {
    let expected = expected.strip_prefix("SHA256:").unwrap_or(expected);
    let expected: String = expected
        .chars()
        .filter(|c| *c != ':')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    expected == fingerprint(hash).replace(':', "")
}

/// Exit status of a finished command.
///
/// libssh2 reports status 0 when the remote sent `exit-signal` instead of
/// `exit-status`, so a signal becomes `128 + signo` like a POSIX shell.
fn exit_code(status: i32, signal: Option<&str>) -> Result<i32> {
    let Some(name) = signal else {
        return Ok(status);
    };
    let name = name.strip_prefix("SIG").unwrap_or(name);
    let signo = match name {
        "HUP" => 1,
        "INT" => 2,
        "QUIT" => 3,
        "ILL" => 4,
        "ABRT" => 6,
        "FPE" => 8,
        "KILL" => 9,
        "USR1" => 10,
        "SEGV" => 11,
        "USR2" => 12,
        "PIPE" => 13,
        "ALRM" => 14,
        "TERM" => 15,
        other => bail!("Remote command killed by unknown signal {other}"),
    };
    Ok(128 + signo)
}

#[cfg(unix)]
fn local_mode(path: &Path) -> i32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| (m.permissions().mode() & 0o777) as i32)
        .unwrap_or(DEFAULT_UPLOAD_MODE)
}

#[cfg(not(unix))]
fn local_mode(_path: &Path) -> i32 {
    DEFAULT_UPLOAD_MODE
}
