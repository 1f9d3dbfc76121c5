//! Magic-number table used to check declared content types.

/// Bytes read from the start of an upload before sniffing.
pub const HEADER_LEN: usize = 32;

/// Headers shorter than this are never compared against the table.
pub const MIN_HEADER_LEN: usize = 2;

const ZIP: &[u8] = b"PK\x03\x04";
const OLE2: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

struct Signature {
    mime: &'static str,
    offset: usize,
    magic: &'static [u8],
}

impl Signature {
    const fn at_start(mime: &'static str, magic: &'static [u8]) -> Self {
        Self { mime, offset: 0, magic }
    }

    fn matches(&self, header: &[u8]) -> bool {
        header
            .get(self.offset..self.offset + self.magic.len())
            .map_or(false, |window| window == self.magic)
    }
}

// Order matters for `detect`: the first match wins, so a generic container
// type comes before the formats that share its header.
static SIGNATURES: &[Signature] = &[
    Signature::at_start("image/png", &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
    Signature::at_start("image/jpeg", &[0xFF, 0xD8, 0xFF]),
    Signature::at_start("image/gif", b"GIF87a"),
    Signature::at_start("image/gif", b"GIF89a"),
    Signature::at_start("application/pdf", b"%PDF"),
    Signature::at_start("application/zip", ZIP),
    Signature::at_start("application/vnd.openxmlformats-officedocument.wordprocessingml.document", ZIP),
    Signature::at_start("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", ZIP),
    Signature::at_start("application/vnd.openxmlformats-officedocument.presentationml.presentation", ZIP),
    Signature::at_start("application/msword", OLE2),
    Signature::at_start("application/vnd.ms-excel", OLE2),
    Signature::at_start("application/vnd.ms-powerpoint", OLE2),
    Signature {
        mime: "video/mp4",
        offset: 4,
        magic: b"ftyp",
    },
    Signature::at_start("image/bmp", b"BM"),
];

/// Whether the table carries a signature for `mime`.
pub fn is_known(mime: &str) -> bool {
    SIGNATURES.iter().any(|sig| sig.mime == mime)
}

/// Whether the header carries one of the signatures registered for `mime`.
pub fn matches(mime: &str, header: &[u8]) -> bool {
    SIGNATURES
        .iter()
        .filter(|sig| sig.mime == mime)
        .any(|sig| sig.matches(header))
}

/// The first table type whose signature the header carries.
pub fn detect(header: &[u8]) -> Option<&'static str> {
    SIGNATURES.iter().find(|sig| sig.matches(header)).map(|sig| sig.mime)
}
