//! Raw-transaction signing outside the network-facing process.
//!
//! [`Signer`] is the port the UTXO pipeline signs through. [`ExternalSigner`]
//! runs a `bitcoin-tx`-style executable under a low-privilege identity and
//! hands it the unsigned transaction, the key and the previous outputs as
//! arguments:
//!
//! ```text
//! <signer> <unsigned hex> set=privatekeys:["<wif>"] set=prevtxs:<json> sign=<mode>
//! ```
//!
//! The signed transaction is read from stdout; stderr carries diagnostics,
//! optionally prefixed with `error:`.

use std::path::PathBuf;
use std::process::{Command, Output};

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::error::BtcError;
use crate::identity::SignerIdentity;
use crate::transaction::PrevTx;

/// Shortest plausible signed transaction: twice the hex length of a hash.
pub const MIN_SIGNED_TX_LEN: usize = 2 * 20;

/// Signature-hash variant a network requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SighashScheme {
    /// `sign=ALL`
    All,
    /// `sign=<height>:ALL`, for chains whose sighash depends on the branch
    /// active at the current height.
    HeightQualified,
    /// `sign=ALL|FORKID`, replay protection for forked chains.
    ForkId,
}

impl SighashScheme {
    /// The signer's mode argument for this scheme at the given chain height.
    pub fn mode_argument(self, height: u64) -> String {
        match self {
            SighashScheme::All => "sign=ALL".to_string(),
            SighashScheme::HeightQualified => format!("sign={height}:ALL"),
            SighashScheme::ForkId => "sign=ALL|FORKID".to_string(),
        }
    }
}

/// Everything needed to sign one raw transaction.
pub struct SignRequest<'a> {
    pub unsigned_tx: &'a str,
    pub inputs: &'a [PrevTx<'a>],
    pub scheme: SighashScheme,
    /// Current chain height, used by [`SighashScheme::HeightQualified`].
    pub height: u64,
    pub private_key: &'a SecretString,
}

/// Signs raw transactions for a UTXO-family coin.
pub trait Signer: Send + Sync {
    /// Returns the signed transaction hex.
    fn sign(&self, request: &SignRequest<'_>) -> Result<String, BtcError>;
}

/// Runs an external signing executable, optionally as another OS user.
#[derive(Debug, Clone)]
pub struct ExternalSigner {
    program: PathBuf,
    identity: Option<SignerIdentity>,
}

impl ExternalSigner {
    /// `identity` of `None` runs the signer as the current user.
    pub fn new(program: impl Into<PathBuf>, identity: Option<SignerIdentity>) -> Self {
        Self {
            program: program.into(),
            identity,
        }
    }

    /// Fails unless the signer executable exists.
    pub fn check_available(&self) -> Result<(), BtcError> {
        std::fs::metadata(&self.program).map(|_| ()).map_err(|_| {
            BtcError::SigningError(format!("signer [{}] not found", self.program.display()))
        })
    }

    fn command(&self, request: &SignRequest<'_>) -> Result<Command, BtcError> {
        let prev_txs = serde_json::to_string(request.inputs)
            .map_err(|e| BtcError::SigningError(format!("encode prevtxs: {e}")))?;
        let key_arg = Zeroizing::new(format!(
            "set=privatekeys:[\"{}\"]",
            request.private_key.expose_secret()
        ));

        let mut cmd = Command::new(&self.program);
        cmd.arg(request.unsigned_tx)
            .arg(key_arg.as_str())
            .arg(format!("set=prevtxs:{prev_txs}"))
            .arg(request.scheme.mode_argument(request.height));

        #[cfg(unix)]
        if let Some(identity) = self.identity {
            use std::os::unix::process::CommandExt;
            cmd.uid(identity.uid).gid(identity.gid);
        }

        Ok(cmd)
    }
}

impl Signer for ExternalSigner {
    fn sign(&self, request: &SignRequest<'_>) -> Result<String, BtcError> {
        let output = self
            .command(request)?
            .output()
            .map_err(|e| BtcError::SigningError(format!("run signer: {e}")))?;

        interpret_output(&output)
    }
}

/// Turns the signer's exit status and streams into a signed transaction.
///
/// On failure a stderr starting with `error:` is surfaced verbatim (minus
/// the token); otherwise the exit status is reported. A zero exit with a
/// reply shorter than [`MIN_SIGNED_TX_LEN`] is still an error.
pub fn interpret_output(output: &Output) -> Result<String, BtcError> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        if let Some(message) = stderr.trim_start().strip_prefix("error:") {
            return Err(BtcError::SigningError(message.trim().to_string()));
        }
        return Err(BtcError::SigningError(format!("signer {}", output.status)));
    }

    let signed = stdout.trim_matches(|c| c == '\n' || c == '\r' || c == ' ');
    if signed.len() < MIN_SIGNED_TX_LEN {
        return Err(BtcError::SigningError(format!(
            "signer reply too short [{signed}]"
        )));
    }

    Ok(signed.to_string())
}
