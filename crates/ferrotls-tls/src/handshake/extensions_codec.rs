//! Builders and parsers for the extensions this engine negotiates.
//!
//! Each builder returns a raw [`Extension`]; each parser takes the
//! extension's opaque data. Extensions not listed here pass through the
//! engine untouched.

use ferrotls_types::TlsError;

use crate::crypt::{NamedGroup, SignatureScheme};
use crate::extensions::{Extension, ExtensionType};
use crate::TlsVersion;

use super::codec::Reader;

// ---------------------------------------------------------------------------
// supported_versions
// ---------------------------------------------------------------------------

/// ClientHello form: a list of offered versions.
pub fn build_supported_versions_ch(versions: &[TlsVersion]) -> Extension {
    let mut data = Vec::with_capacity(1 + versions.len() * 2);
    data.push((versions.len() * 2) as u8);
    for v in versions {
        data.extend_from_slice(&v.wire().to_be_bytes());
    }
    Extension::new(ExtensionType::SUPPORTED_VERSIONS, data)
}

/// Parse the ClientHello form; returns the raw offered version codes.
pub fn parse_supported_versions_ch(data: &[u8]) -> Result<Vec<u16>, TlsError> {
    let mut r = Reader::new(data);
    let list = r.vec8("supported_versions list")?;
    r.expect_done("supported_versions")?;
    if list.is_empty() || list.len() % 2 != 0 {
        return Err(TlsError::Decode("malformed supported_versions".into()));
    }
    Ok(list
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect())
}

/// ServerHello form: the single selected version.
pub fn build_supported_versions_sh(version: TlsVersion) -> Extension {
    Extension::new(
        ExtensionType::SUPPORTED_VERSIONS,
        version.wire().to_be_bytes().to_vec(),
    )
}

pub fn parse_supported_versions_sh(data: &[u8]) -> Result<u16, TlsError> {
    if data.len() != 2 {
        return Err(TlsError::Decode("supported_versions must be 2 bytes".into()));
    }
    Ok(u16::from_be_bytes([data[0], data[1]]))
}

// ---------------------------------------------------------------------------
// supported_groups / signature_algorithms
// ---------------------------------------------------------------------------

pub fn build_supported_groups(groups: &[NamedGroup]) -> Extension {
    let mut data = Vec::with_capacity(2 + groups.len() * 2);
    data.extend_from_slice(&((groups.len() * 2) as u16).to_be_bytes());
    for g in groups {
        data.extend_from_slice(&g.0.to_be_bytes());
    }
    Extension::new(ExtensionType::SUPPORTED_GROUPS, data)
}

pub fn parse_supported_groups(data: &[u8]) -> Result<Vec<NamedGroup>, TlsError> {
    let mut r = Reader::new(data);
    let list = r.vec16("supported_groups list")?;
    r.expect_done("supported_groups")?;
    if list.len() % 2 != 0 {
        return Err(TlsError::Decode("malformed supported_groups".into()));
    }
    Ok(list
        .chunks_exact(2)
        .map(|c| NamedGroup(u16::from_be_bytes([c[0], c[1]])))
        .collect())
}

pub fn build_signature_algorithms(schemes: &[SignatureScheme]) -> Extension {
    let mut data = Vec::with_capacity(2 + schemes.len() * 2);
    data.extend_from_slice(&((schemes.len() * 2) as u16).to_be_bytes());
    for s in schemes {
        data.extend_from_slice(&s.0.to_be_bytes());
    }
    Extension::new(ExtensionType::SIGNATURE_ALGORITHMS, data)
}

pub fn parse_signature_algorithms(data: &[u8]) -> Result<Vec<SignatureScheme>, TlsError> {
    let mut r = Reader::new(data);
    let list = r.vec16("signature_algorithms list")?;
    r.expect_done("signature_algorithms")?;
    if list.is_empty() || list.len() % 2 != 0 {
        return Err(TlsError::Decode("malformed signature_algorithms".into()));
    }
    Ok(list
        .chunks_exact(2)
        .map(|c| SignatureScheme(u16::from_be_bytes([c[0], c[1]])))
        .collect())
}

// ---------------------------------------------------------------------------
// key_share
// ---------------------------------------------------------------------------

/// A key_share entry: group plus opaque public share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShareEntry {
    pub group: NamedGroup,
    pub key_exchange: Vec<u8>,
}

fn encode_key_share_entry(entry: &KeyShareEntry, out: &mut Vec<u8>) {
    out.extend_from_slice(&entry.group.0.to_be_bytes());
    out.extend_from_slice(&(entry.key_exchange.len() as u16).to_be_bytes());
    out.extend_from_slice(&entry.key_exchange);
}

/// ClientHello form: a list of offered shares.
pub fn build_key_share_ch(entries: &[KeyShareEntry]) -> Extension {
    let mut shares = Vec::new();
    for entry in entries {
        encode_key_share_entry(entry, &mut shares);
    }
    let mut data = Vec::with_capacity(2 + shares.len());
    data.extend_from_slice(&(shares.len() as u16).to_be_bytes());
    data.extend_from_slice(&shares);
    Extension::new(ExtensionType::KEY_SHARE, data)
}

pub fn parse_key_share_ch(data: &[u8]) -> Result<Vec<KeyShareEntry>, TlsError> {
    let mut r = Reader::new(data);
    let list = r.vec16("key_share list")?;
    r.expect_done("key_share")?;
    let mut inner = Reader::new(list);
    let mut entries = Vec::new();
    while !inner.is_done() {
        let group = NamedGroup(inner.u16("key_share group")?);
        let key_exchange = inner.vec16("key_share data")?.to_vec();
        entries.push(KeyShareEntry {
            group,
            key_exchange,
        });
    }
    Ok(entries)
}

/// ServerHello form: the single selected share.
pub fn build_key_share_sh(entry: &KeyShareEntry) -> Extension {
    let mut data = Vec::new();
    encode_key_share_entry(entry, &mut data);
    Extension::new(ExtensionType::KEY_SHARE, data)
}

pub fn parse_key_share_sh(data: &[u8]) -> Result<KeyShareEntry, TlsError> {
    let mut r = Reader::new(data);
    let group = NamedGroup(r.u16("key_share group")?);
    let key_exchange = r.vec16("key_share data")?.to_vec();
    r.expect_done("key_share")?;
    Ok(KeyShareEntry {
        group,
        key_exchange,
    })
}

/// HelloRetryRequest form: the group the client must retry with.
pub fn build_key_share_hrr(group: NamedGroup) -> Extension {
    Extension::new(ExtensionType::KEY_SHARE, group.0.to_be_bytes().to_vec())
}

pub fn parse_key_share_hrr(data: &[u8]) -> Result<NamedGroup, TlsError> {
    if data.len() != 2 {
        return Err(TlsError::Decode("HRR key_share must be 2 bytes".into()));
    }
    Ok(NamedGroup(u16::from_be_bytes([data[0], data[1]])))
}

// ---------------------------------------------------------------------------
// server_name
// ---------------------------------------------------------------------------

pub fn build_server_name(host: &str) -> Extension {
    let name = host.as_bytes();
    let mut data = Vec::with_capacity(5 + name.len());
    data.extend_from_slice(&((3 + name.len()) as u16).to_be_bytes());
    data.push(0); // host_name
    data.extend_from_slice(&(name.len() as u16).to_be_bytes());
    data.extend_from_slice(name);
    Extension::new(ExtensionType::SERVER_NAME, data)
}

pub fn parse_server_name(data: &[u8]) -> Result<String, TlsError> {
    let mut r = Reader::new(data);
    let list = r.vec16("server_name list")?;
    let mut inner = Reader::new(list);
    while !inner.is_done() {
        let name_type = inner.u8("server_name type")?;
        let name = inner.vec16("server_name")?;
        if name_type == 0 {
            return String::from_utf8(name.to_vec())
                .map_err(|_| TlsError::Decode("server_name not UTF-8".into()));
        }
    }
    Err(TlsError::Decode("no host_name entry in server_name".into()))
}

// ---------------------------------------------------------------------------
// ALPN
// ---------------------------------------------------------------------------

pub fn build_alpn(protocols: &[Vec<u8>]) -> Extension {
    let mut list = Vec::new();
    for proto in protocols {
        list.push(proto.len() as u8);
        list.extend_from_slice(proto);
    }
    let mut data = Vec::with_capacity(2 + list.len());
    data.extend_from_slice(&(list.len() as u16).to_be_bytes());
    data.extend_from_slice(&list);
    Extension::new(ExtensionType::APPLICATION_LAYER_PROTOCOL_NEGOTIATION, data)
}

pub fn parse_alpn_list(data: &[u8]) -> Result<Vec<Vec<u8>>, TlsError> {
    let mut r = Reader::new(data);
    let list = r.vec16("alpn list")?;
    r.expect_done("alpn")?;
    let mut inner = Reader::new(list);
    let mut protocols = Vec::new();
    while !inner.is_done() {
        let proto = inner.vec8("alpn protocol")?;
        if proto.is_empty() {
            return Err(TlsError::Decode("empty ALPN protocol name".into()));
        }
        protocols.push(proto.to_vec());
    }
    if protocols.is_empty() {
        return Err(TlsError::Decode("empty ALPN list".into()));
    }
    Ok(protocols)
}

/// Server answer: exactly one protocol.
pub fn parse_alpn_selected(data: &[u8]) -> Result<Vec<u8>, TlsError> {
    let protocols = parse_alpn_list(data)?;
    if protocols.len() != 1 {
        return Err(TlsError::Decode("server must select exactly one ALPN protocol".into()));
    }
    Ok(protocols.into_iter().next().expect("length checked"))
}

// ---------------------------------------------------------------------------
// PSK / resumption
// ---------------------------------------------------------------------------

/// `psk_dhe_ke` is the only mode this engine offers or accepts.
pub fn build_psk_key_exchange_modes() -> Extension {
    Extension::new(ExtensionType::PSK_KEY_EXCHANGE_MODES, vec![1, 1])
}

pub fn parse_psk_key_exchange_modes(data: &[u8]) -> Result<Vec<u8>, TlsError> {
    let mut r = Reader::new(data);
    let modes = r.vec8("psk_key_exchange_modes")?.to_vec();
    r.expect_done("psk_key_exchange_modes")?;
    if modes.is_empty() {
        return Err(TlsError::Decode("empty psk_key_exchange_modes".into()));
    }
    Ok(modes)
}

/// One offered PSK identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PskIdentity {
    pub identity: Vec<u8>,
    pub obfuscated_ticket_age: u32,
}

/// ClientHello pre_shared_key: identities plus binders. The binder list
/// layout is fixed, so the caller can compute binders over the
/// truncated ClientHello and patch them in place.
pub fn build_pre_shared_key_ch(identities: &[PskIdentity], binders: &[Vec<u8>]) -> Extension {
    let mut ids = Vec::new();
    for id in identities {
        ids.extend_from_slice(&(id.identity.len() as u16).to_be_bytes());
        ids.extend_from_slice(&id.identity);
        ids.extend_from_slice(&id.obfuscated_ticket_age.to_be_bytes());
    }
    let mut bds = Vec::new();
    for binder in binders {
        bds.push(binder.len() as u8);
        bds.extend_from_slice(binder);
    }
    let mut data = Vec::with_capacity(4 + ids.len() + bds.len());
    data.extend_from_slice(&(ids.len() as u16).to_be_bytes());
    data.extend_from_slice(&ids);
    data.extend_from_slice(&(bds.len() as u16).to_be_bytes());
    data.extend_from_slice(&bds);
    Extension::new(ExtensionType::PRE_SHARED_KEY, data)
}

/// Parse the ClientHello form; returns (identities, binders).
pub fn parse_pre_shared_key_ch(
    data: &[u8],
) -> Result<(Vec<PskIdentity>, Vec<Vec<u8>>), TlsError> {
    let mut r = Reader::new(data);
    let ids_block = r.vec16("psk identities")?;
    let binders_block = r.vec16("psk binders")?;
    r.expect_done("pre_shared_key")?;

    let mut ids = Reader::new(ids_block);
    let mut identities = Vec::new();
    while !ids.is_done() {
        let identity = ids.vec16("psk identity")?.to_vec();
        let obfuscated_ticket_age = ids.u32("obfuscated_ticket_age")?;
        identities.push(PskIdentity {
            identity,
            obfuscated_ticket_age,
        });
    }

    let mut bds = Reader::new(binders_block);
    let mut binders = Vec::new();
    while !bds.is_done() {
        binders.push(bds.vec8("psk binder")?.to_vec());
    }

    if identities.is_empty() || identities.len() != binders.len() {
        return Err(TlsError::Decode("psk identities/binders mismatch".into()));
    }
    Ok((identities, binders))
}

/// ServerHello pre_shared_key: the selected identity index.
pub fn build_pre_shared_key_sh(selected: u16) -> Extension {
    Extension::new(ExtensionType::PRE_SHARED_KEY, selected.to_be_bytes().to_vec())
}

pub fn parse_pre_shared_key_sh(data: &[u8]) -> Result<u16, TlsError> {
    if data.len() != 2 {
        return Err(TlsError::Decode("pre_shared_key must be 2 bytes".into()));
    }
    Ok(u16::from_be_bytes([data[0], data[1]]))
}

/// Wire size of the binder list for patch-in-place binder computation:
/// `2 + Σ(1 + len)`.
pub fn binders_list_len(binder_lens: &[usize]) -> usize {
    2 + binder_lens.iter().map(|l| 1 + l).sum::<usize>()
}

// ---------------------------------------------------------------------------
// TLS 1.2 session_ticket / extended_master_secret
// ---------------------------------------------------------------------------

/// RFC 5077: the extension data is the raw ticket (empty = request one).
pub fn build_session_ticket(ticket: &[u8]) -> Extension {
    Extension::new(ExtensionType::SESSION_TICKET, ticket.to_vec())
}

pub fn build_extended_master_secret() -> Extension {
    Extension::new(ExtensionType::EXTENDED_MASTER_SECRET, Vec::new())
}

// ---------------------------------------------------------------------------
// early_data / cookie
// ---------------------------------------------------------------------------

/// NewSessionTicket form carries max_early_data_size.
pub fn build_early_data_nst(max_early_data: u32) -> Extension {
    Extension::new(ExtensionType::EARLY_DATA, max_early_data.to_be_bytes().to_vec())
}

pub fn parse_early_data_nst(data: &[u8]) -> Result<u32, TlsError> {
    if data.len() != 4 {
        return Err(TlsError::Decode("early_data in NST must be 4 bytes".into()));
    }
    Ok(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
}

pub fn build_cookie(cookie: &[u8]) -> Extension {
    let mut data = Vec::with_capacity(2 + cookie.len());
    data.extend_from_slice(&(cookie.len() as u16).to_be_bytes());
    data.extend_from_slice(cookie);
    Extension::new(ExtensionType::COOKIE, data)
}

pub fn parse_cookie(data: &[u8]) -> Result<Vec<u8>, TlsError> {
    let mut r = Reader::new(data);
    let cookie = r.vec16("cookie")?.to_vec();
    r.expect_done("cookie")?;
    Ok(cookie)
}
