use std::path::Path;

use crate::error::BtcError;

/// Account database consulted for the signer's identity.
pub const PASSWD_PATH: &str = "/etc/passwd";

/// OS account the external signer runs under.
pub const DEFAULT_SIGNER_ACCOUNT: &str = "nobody";

/// Numeric user and group the signer process is started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignerIdentity {
    pub uid: u32,
    pub gid: u32,
}

impl SignerIdentity {
    /// Looks `account` up in a passwd-format file.
    ///
    /// Only local entries are seen. Accounts served through NSS modules
    /// (LDAP, sssd) are not resolved and must be added to the file.
    pub fn lookup_in(passwd: &Path, account: &str) -> Result<Self, BtcError> {
        let contents = std::fs::read_to_string(passwd).map_err(|e| {
            BtcError::Identity(format!("read {}: {e}", passwd.display()))
        })?;
        parse_passwd(&contents, account)
    }
}

/// Finds `account` in passwd-format text (`name:pw:uid:gid:...`).
pub fn parse_passwd(contents: &str, account: &str) -> Result<SignerIdentity, BtcError> {
    let line = contents
        .lines()
        .filter(|l| !l.starts_with('#'))
        .find(|l| l.split(':').next() == Some(account))
        .ok_or_else(|| BtcError::Identity(format!("no account named [{account}]")))?;

    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 4 {
        return Err(BtcError::Identity(format!("malformed entry for {account}")));
    }

    let uid = fields[2]
        .parse()
        .map_err(|_| BtcError::Identity(format!("invalid user uid {}", fields[2])))?;
    let gid = fields[3]
        .parse()
        .map_err(|_| BtcError::Identity(format!("invalid user gid {}", fields[3])))?;

    Ok(SignerIdentity { uid, gid })
}
