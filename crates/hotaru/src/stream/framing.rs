//! `multipart/x-mixed-replace` framing
//!
//! Every part goes out as boundary, part header, then payload:
//!
//! ```text
//! \r\n--<boundary>\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <len>\r\n
//! \r\n
//! <len bytes>
//! ```
//!
//! The order is fixed for the lifetime of every session.

use bytes::Bytes;

macro_rules! boundary {
    () => {
        "123456789000000000000987654321"
    };
}

pub const BOUNDARY: &str = boundary!();

/// Response content type announced during negotiation.
pub const CONTENT_TYPE: &str = concat!("multipart/x-mixed-replace;boundary=", boundary!());

/// Delimiter written before every part.
pub const PART_BOUNDARY: &str = concat!("\r\n--", boundary!(), "\r\n");

pub fn part_header(len: usize) -> Bytes {
    Bytes::from(format!(
        "Content-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        len
    ))
}

/// The three chunks of one part, in write order.
pub fn frame_part(payload: &Bytes) -> [Bytes; 3] {
    [
        Bytes::from_static(PART_BOUNDARY.as_bytes()),
        part_header(payload.len()),
        payload.clone(),
    ]
}
