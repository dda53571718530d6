//! Routing-key derivation from journal records.
//!
//! Records produced by the pipeline are tab-separated lines whose leading
//! marker identifies the record kind:
//!
//! ```text
//! M<ip>\t<timestamp>\t<uuid field>\t<metric name>\t...
//! M\t<ip>\t<timestamp>\t<uuid field>\t<metric name>\t...
//! ```
//!
//! For kinds that carry a check identity, the UUID field ends in the check's
//! canonical UUID and may embed an account/check pair as
//! `` target`module`c_<account>_<check>_...`<uuid> ``. The derived routing key
//! lets topic bindings shard on account and check without a lookup table:
//!
//! ```text
//! <base>.<acct % 16 hex>.<(acct / 16) % 16 hex>.<acct>.<check>.<u>.<u>...  (32 digits)
//! ```

use std::borrow::Cow;

/// Length of a canonical textual UUID
pub const UUID_STR_LEN: usize = 36;

const UUID_HEX_DIGITS: usize = 32;

/// Record kinds routed by check identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// `M`
    Metric,
    /// `S`
    Status,
    /// `C`
    Check,
    /// `H1`
    Histogram,
    /// `F1`
    Flatbuffer,
    /// `B1`
    Bundle,
    /// `B2`
    CompressedBundle,
}

impl RecordKind {
    /// Identify the record kind from the payload's leading marker
    pub fn from_marker(payload: &[u8]) -> Option<Self> {
        match payload {
            [b'M', ..] => Some(RecordKind::Metric),
            [b'S', ..] => Some(RecordKind::Status),
            [b'C', ..] => Some(RecordKind::Check),
            [b'H', b'1', ..] => Some(RecordKind::Histogram),
            [b'F', b'1', ..] => Some(RecordKind::Flatbuffer),
            [b'B', b'1', ..] => Some(RecordKind::Bundle),
            [b'B', b'2', ..] => Some(RecordKind::CompressedBundle),
            _ => None,
        }
    }

    /// The marker text
    pub fn marker(&self) -> &'static str {
        match self {
            RecordKind::Metric => "M",
            RecordKind::Status => "S",
            RecordKind::Check => "C",
            RecordKind::Histogram => "H1",
            RecordKind::Flatbuffer => "F1",
            RecordKind::Bundle => "B1",
            RecordKind::CompressedBundle => "B2",
        }
    }
}

/// Check identity pulled out of a record's UUID field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIdentity {
    /// 0 when the field carries no `c_<account>_<check>` block
    pub account_id: u64,
    /// 0 when the field carries no `c_<account>_<check>` block
    pub check_id: u64,
    /// UUID hex digits, each preceded by `.`
    pub encoded_uuid: String,
}

impl CheckIdentity {
    /// Routing-key suffix appended to a non-empty base key
    pub fn routing_suffix(&self) -> String {
        format!(
            ".{:x}.{:x}.{}.{}{}",
            self.account_id % 16,
            (self.account_id / 16) % 16,
            self.account_id,
            self.check_id,
            self.encoded_uuid
        )
    }
}

/// Computes the effective routing key for each outgoing record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingKeyDeriver {
    base: String,
}

impl RoutingKeyDeriver {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Configured base key
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Effective routing key for `payload`
    ///
    /// Falls back to the base key whenever the record kind is not routed by
    /// identity or its UUID field cannot be parsed. An empty base key is
    /// never extended.
    pub fn derive(&self, payload: &[u8]) -> Cow<'_, str> {
        if self.base.is_empty() {
            return Cow::Borrowed(&self.base);
        }
        match extract_check_identity(payload) {
            Some(identity) => Cow::Owned(format!("{}{}", self.base, identity.routing_suffix())),
            None => Cow::Borrowed(&self.base),
        }
    }
}

/// Parse the check identity out of a journal record
///
/// Returns `None` for unrouted record kinds, truncated records and UUID
/// fields that do not end in a lowercase canonical UUID. An irregular
/// `c_<account>_<check>` block is not an error: the ids stay 0.
pub fn extract_check_identity(payload: &[u8]) -> Option<CheckIdentity> {
    let kind = RecordKind::from_marker(payload)?;
    let field = uuid_field(payload, kind)?;

    if field.len() < UUID_STR_LEN {
        return None;
    }

    let (account_id, check_id) = if field.len() > UUID_STR_LEN {
        account_and_check(&field[..field.len() - UUID_STR_LEN])
    } else {
        (0, 0)
    };

    let encoded_uuid = encode_uuid(&field[field.len() - UUID_STR_LEN..])?;

    Some(CheckIdentity {
        account_id,
        check_id,
        encoded_uuid,
    })
}

/// Encode UUID text as `.`-prefixed hex digits, dropping hyphens
///
/// Only lowercase hex digits and `-` are accepted; at most 32 digits are kept.
pub fn encode_uuid(text: &[u8]) -> Option<String> {
    let mut encoded = String::with_capacity(UUID_HEX_DIGITS * 2);
    let mut digits = 0;

    for &b in text {
        if digits == UUID_HEX_DIGITS {
            break;
        }
        match b {
            b'0'..=b'9' | b'a'..=b'f' => {
                encoded.push('.');
                encoded.push(char::from(b));
                digits += 1;
            }
            b'-' => {}
            _ => return None,
        }
    }

    Some(encoded)
}

/// The tab-terminated field following the timestamp
fn uuid_field(payload: &[u8], kind: RecordKind) -> Option<&[u8]> {
    let mut rest = &payload[kind.marker().len()..];
    // The marker is either fused to the source address or a field of its own.
    if let Some(stripped) = rest.strip_prefix(b"\t") {
        rest = stripped;
    }

    // Skip the source address and timestamp fields.
    for _ in 0..2 {
        let tab = rest.iter().position(|&b| b == b'\t')?;
        rest = &rest[tab + 1..];
    }

    let end = rest.iter().position(|&b| b == b'\t')?;
    Some(&rest[..end])
}

/// Account and check ids from the text preceding the UUID
fn account_and_check(prefix: &[u8]) -> (u64, u64) {
    let mut ticks = prefix
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'`')
        .map(|(i, _)| i);

    let Some(first) = ticks.next() else {
        return (0, 0);
    };
    let second = ticks.next();

    let block = second
        .map(|i| &prefix[i + 1..])
        .filter(|text| text.starts_with(b"c_"))
        .or_else(|| Some(&prefix[first + 1..]).filter(|text| text.starts_with(b"c_")));

    match block {
        Some(block) => parse_ids(&block[2..]),
        None => (0, 0),
    }
}

fn parse_ids(text: &[u8]) -> (u64, u64) {
    let account_id = leading_number(text);
    let check_id = text
        .iter()
        .position(|&b| b == b'_')
        .map(|i| leading_number(&text[i + 1..]))
        .unwrap_or(0);
    (account_id, check_id)
}

fn leading_number(text: &[u8]) -> u64 {
    let len = text.iter().take_while(|b| b.is_ascii_digit()).count();
    std::str::from_utf8(&text[..len])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}
