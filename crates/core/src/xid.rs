//! XA transaction identifiers, flags and prepare votes

use crate::error::{XaError, XaResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// No flags set.
pub const TMNOFLAGS: i32 = 0x0000_0000;
/// Caller is joining an existing transaction branch.
pub const TMJOIN: i32 = 0x0020_0000;
/// Caller is resuming association with a suspended branch.
pub const TMRESUME: i32 = 0x0800_0000;
/// Dissociate caller from the branch, work succeeded.
pub const TMSUCCESS: i32 = 0x0400_0000;
/// Dissociate caller from the branch, work failed.
pub const TMFAIL: i32 = 0x2000_0000;
/// Caller is suspending its association with the branch.
pub const TMSUSPEND: i32 = 0x0200_0000;
/// Start a recovery scan.
pub const TMSTARTRSCAN: i32 = 0x0100_0000;
/// End a recovery scan.
pub const TMENDRSCAN: i32 = 0x0080_0000;
/// Use one-phase commit.
pub const TMONEPHASE: i32 = 0x4000_0000;

/// Outcome of `prepare`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    /// Branch is prepared and can be committed (`XA_OK`)
    Ok,
    /// Branch was read-only and is already complete (`XA_RDONLY`)
    ReadOnly,
}

impl Vote {
    /// Numeric XA return value
    pub fn code(&self) -> i32 {
        match self {
            Vote::Ok => 0,
            Vote::ReadOnly => 3,
        }
    }
}

/// X/Open transaction branch identifier
///
/// Identifies one branch of a global transaction. Equality is structural so
/// an Xid returned by `recover` can be matched against a transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawXid")]
pub struct Xid {
    format_id: i32,
    global_transaction_id: Vec<u8>,
    branch_qualifier: Vec<u8>,
}

impl Xid {
    /// Maximum length of the global transaction id
    pub const MAXGTRIDSIZE: usize = 64;
    /// Maximum length of the branch qualifier
    pub const MAXBQUALSIZE: usize = 64;

    /// Create an Xid
    ///
    /// # Errors
    ///
    /// Returns `XAER_INVAL` if either part exceeds its maximum size.
    pub fn new(
        format_id: i32,
        global_transaction_id: &[u8],
        branch_qualifier: &[u8],
    ) -> XaResult<Self> {
        if global_transaction_id.len() > Self::MAXGTRIDSIZE {
            return Err(XaError::invalid(format!(
                "global transaction id is {} bytes, maximum is {}",
                global_transaction_id.len(),
                Self::MAXGTRIDSIZE
            )));
        }
        if branch_qualifier.len() > Self::MAXBQUALSIZE {
            return Err(XaError::invalid(format!(
                "branch qualifier is {} bytes, maximum is {}",
                branch_qualifier.len(),
                Self::MAXBQUALSIZE
            )));
        }
        Ok(Xid {
            format_id,
            global_transaction_id: global_transaction_id.to_vec(),
            branch_qualifier: branch_qualifier.to_vec(),
        })
    }

    /// Generate a random Xid with format id 0
    pub fn generate() -> Self {
        Xid {
            format_id: 0,
            global_transaction_id: Uuid::new_v4().as_bytes().to_vec(),
            branch_qualifier: Uuid::new_v4().as_bytes().to_vec(),
        }
    }

    /// Format identifier
    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    /// Global transaction id
    pub fn global_transaction_id(&self) -> &[u8] {
        &self.global_transaction_id
    }

    /// Branch qualifier
    pub fn branch_qualifier(&self) -> &[u8] {
        &self.branch_qualifier
    }
}

/// Unvalidated wire form; deserialization goes through `Xid::new`
#[derive(Deserialize)]
struct RawXid {
    format_id: i32,
    global_transaction_id: Vec<u8>,
    branch_qualifier: Vec<u8>,
}

impl TryFrom<RawXid> for Xid {
    type Error = XaError;

    fn try_from(raw: RawXid) -> XaResult<Self> {
        Xid::new(
            raw.format_id,
            &raw.global_transaction_id,
            &raw.branch_qualifier,
        )
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.format_id)?;
        write_hex(f, &self.global_transaction_id)?;
        write!(f, ":")?;
        write_hex(f, &self.branch_qualifier)
    }
}
