//! `RTM_GETNSID` over rtnetlink.
//!
//! Asks the network namespace the calling thread is in which namespace ID
//! (nsid) it uses for another namespace, designated by an open nsfs file
//! descriptor. The request is `nlmsghdr`, a padded `rtgenmsg`, and a single
//! `NETNSA_FD` attribute; the kernel answers with `RTM_NEWNSID` carrying
//! `NETNSA_NSID`, or with `NLMSG_ERROR`.

use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};

use nix::sys::socket::{MsgFlags, recv, send};

use vethpeer_common::error::{Result, VethpeerError};
use vethpeer_common::types::RelativeNamespaceId;

const NLMSG_ALIGNTO: usize = 4;
const NLMSG_HDRLEN: usize = 16;
const NLA_HDRLEN: usize = 4;
/// `rtgenmsg` is a single byte, padded to the netlink alignment.
const RTGENMSG_LEN: usize = 4;

const NLMSG_ERROR: u16 = 0x2;
const NLMSG_DONE: u16 = 0x3;
const NLM_F_REQUEST: u16 = 0x1;

const NLA_TYPE_MASK: u16 = 0x3fff;
const NETNSA_NSID: u16 = 1;
const NETNSA_FD: u16 = 3;

const RECV_BUF_LEN: usize = 4096;

const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// Decoded answer to an `RTM_GETNSID` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsidReply {
    /// The namespace has an ID for the target.
    Assigned(RelativeNamespaceId),
    /// The namespace has no ID for the target (`NETNSA_NSID_NOT_ASSIGNED`).
    NotAssigned,
    /// The kernel rejected the request with this errno.
    Errno(i32),
}

/// Builds an `RTM_GETNSID` request for the namespace behind `target_fd`.
#[must_use]
pub fn encode_request(seq: u32, target_fd: u32) -> Vec<u8> {
    let len = NLMSG_HDRLEN + RTGENMSG_LEN + NLA_HDRLEN + 4;
    let mut buf = Vec::with_capacity(len);

    #[allow(clippy::cast_possible_truncation)]
    buf.extend_from_slice(&(len as u32).to_ne_bytes());
    buf.extend_from_slice(&libc::RTM_GETNSID.to_ne_bytes());
    buf.extend_from_slice(&NLM_F_REQUEST.to_ne_bytes());
    buf.extend_from_slice(&seq.to_ne_bytes());
    buf.extend_from_slice(&0u32.to_ne_bytes());

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    buf.extend_from_slice(&[libc::AF_UNSPEC as u8, 0, 0, 0]);

    #[allow(clippy::cast_possible_truncation)]
    buf.extend_from_slice(&((NLA_HDRLEN + 4) as u16).to_ne_bytes());
    buf.extend_from_slice(&NETNSA_FD.to_ne_bytes());
    buf.extend_from_slice(&target_fd.to_ne_bytes());

    buf
}

fn malformed(message: impl Into<String>) -> VethpeerError {
    VethpeerError::Parse {
        what: "RTM_NEWNSID reply",
        message: message.into(),
    }
}

fn read_u16(buf: &[u8], at: usize) -> Result<u16> {
    buf.get(at..at + 2)
        .and_then(|b| b.try_into().ok())
        .map(u16::from_ne_bytes)
        .ok_or_else(|| malformed(format!("truncated at offset {at}")))
}

fn read_u32(buf: &[u8], at: usize) -> Result<u32> {
    buf.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_ne_bytes)
        .ok_or_else(|| malformed(format!("truncated at offset {at}")))
}

fn read_i32(buf: &[u8], at: usize) -> Result<i32> {
    buf.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(i32::from_ne_bytes)
        .ok_or_else(|| malformed(format!("truncated at offset {at}")))
}

/// Extracts `NETNSA_NSID` from the attributes following the `rtgenmsg`.
fn decode_nsid_attrs(attrs: &[u8]) -> Result<NsidReply> {
    let mut offset = 0;
    while offset + NLA_HDRLEN <= attrs.len() {
        let nla_len = usize::from(read_u16(attrs, offset)?);
        let nla_type = read_u16(attrs, offset + 2)? & NLA_TYPE_MASK;
        if nla_len < NLA_HDRLEN || offset + nla_len > attrs.len() {
            return Err(malformed(format!("bad attribute length {nla_len}")));
        }

        if nla_type == NETNSA_NSID {
            let raw = read_i32(attrs, offset + NLA_HDRLEN)?;
            return Ok(RelativeNamespaceId::from_raw(i64::from(raw))
                .map_or(NsidReply::NotAssigned, NsidReply::Assigned));
        }
        offset += nlmsg_align(nla_len);
    }
    Err(malformed("no NETNSA_NSID attribute"))
}

/// Decodes the kernel's answer to the request sent with sequence `seq`.
///
/// # Errors
///
/// Returns [`VethpeerError::Parse`] if the buffer does not hold a complete
/// answer to that request.
pub fn decode_reply(buf: &[u8], seq: u32) -> Result<NsidReply> {
    let mut offset = 0;
    while offset + NLMSG_HDRLEN <= buf.len() {
        let msg_len = read_u32(buf, offset)? as usize;
        let msg_type = read_u16(buf, offset + 4)?;
        let msg_seq = read_u32(buf, offset + 8)?;
        if msg_len < NLMSG_HDRLEN || offset + msg_len > buf.len() {
            return Err(malformed(format!("bad message length {msg_len}")));
        }
        let payload = &buf[offset + NLMSG_HDRLEN..offset + msg_len];

        if msg_seq == seq {
            match msg_type {
                NLMSG_ERROR => {
                    let error = read_i32(payload, 0)?;
                    if error != 0 {
                        return Ok(NsidReply::Errno(-error));
                    }
                }
                t if t == libc::RTM_NEWNSID => {
                    let attrs = payload
                        .get(RTGENMSG_LEN..)
                        .ok_or_else(|| malformed("missing rtgenmsg"))?;
                    return decode_nsid_attrs(attrs);
                }
                NLMSG_DONE => break,
                other => tracing::trace!(msg_type = other, "ignoring netlink message"),
            }
        }
        offset += nlmsg_align(msg_len);
    }
    Err(malformed("no RTM_NEWNSID message"))
}

fn open_route_socket(target: &str) -> Result<OwnedFd> {
    use nix::sys::socket::{AddressFamily, SockFlag, SockProtocol, SockType, socket};

    socket(
        AddressFamily::Netlink,
        SockType::Raw,
        SockFlag::SOCK_CLOEXEC,
        SockProtocol::NetlinkRoute,
    )
    .map_err(|e| VethpeerError::NsidQueryFailed {
        target: target.to_string(),
        message: format!("netlink socket: {e}"),
    })
}

/// Returns the ID the current namespace uses for the namespace behind `ns`.
///
/// `target` only names the namespace in errors. The netlink socket is
/// created inside the namespace active on the calling thread and closed
/// before returning.
///
/// # Errors
///
/// Returns [`VethpeerError::NsidQueryFailed`] if the socket cannot be used or
/// the kernel rejects the request, and [`VethpeerError::Parse`] if the reply
/// is malformed.
pub fn query(ns: BorrowedFd<'_>, target: &str) -> Result<Option<RelativeNamespaceId>> {
    const SEQ: u32 = 1;

    let failed = |message: String| VethpeerError::NsidQueryFailed {
        target: target.to_string(),
        message,
    };

    let sock = open_route_socket(target)?;
    #[allow(clippy::cast_sign_loss)]
    let request = encode_request(SEQ, ns.as_raw_fd() as u32);

    let sent = send(sock.as_raw_fd(), &request, MsgFlags::empty())
        .map_err(|e| failed(format!("send: {e}")))?;
    if sent != request.len() {
        return Err(failed(format!("short send: {sent} of {} bytes", request.len())));
    }

    let mut buf = vec![0u8; RECV_BUF_LEN];
    let received = recv(sock.as_raw_fd(), &mut buf, MsgFlags::empty())
        .map_err(|e| failed(format!("recv: {e}")))?;
    buf.truncate(received);

    match decode_reply(&buf, SEQ)? {
        NsidReply::Assigned(id) => Ok(Some(id)),
        NsidReply::NotAssigned => Ok(None),
        NsidReply::Errno(errno) => Err(failed(nix::errno::Errno::from_raw(errno).to_string())),
    }
}
