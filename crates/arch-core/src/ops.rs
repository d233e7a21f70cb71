use serde::{Deserialize, Serialize};

use crate::segments::{SegReg, SegmentSelector};
use crate::types::Width;

/// Privileged instruction sequences the harness issues directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivilegedOp {
    /// `LSL`: load the byte limit of the segment named by `selector`.
    ReadSegmentLimit { selector: SegmentSelector },
    /// `REP OUTS`: write `count` elements of `width` from `segment:offset` to `port`.
    RepeatedPortWrite { port: u16, width: Width, segment: SegReg, offset: u32, count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpOutcome {
    /// `None` when LSL clears ZF (selector not accessible or not a segment).
    SegmentLimit(Option<u32>),
    /// Number of elements transferred before the count reached zero.
    PortWrite { transferred: u32 },
}
