//! Leading-byte signatures for files whose extension tells us nothing.

/// Bytes read from the start of a file for signature matching.
pub const SNIFF_LEN: usize = 512;

struct Signature {
    offset: usize,
    magic: &'static [u8],
    category: &'static str,
}

const SIGNATURES: &[Signature] = &[
    Signature { offset: 0, magic: b"%PDF-", category: "pdf" },
    Signature { offset: 0, magic: b"PK\x03\x04", category: "archive" },
    Signature { offset: 0, magic: b"PK\x05\x06", category: "archive" },
    Signature { offset: 0, magic: &[0x1f, 0x8b], category: "archive" },
    Signature { offset: 0, magic: b"BZh", category: "archive" },
    Signature { offset: 0, magic: &[0xfd, b'7', b'z', b'X', b'Z', 0x00], category: "archive" },
    Signature { offset: 0, magic: &[b'7', b'z', 0xbc, 0xaf, 0x27, 0x1c], category: "archive" },
    Signature { offset: 0, magic: b"Rar!\x1a\x07", category: "archive" },
    Signature { offset: 257, magic: b"ustar", category: "archive" },
    Signature { offset: 0, magic: &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a], category: "image" },
    Signature { offset: 0, magic: &[0xff, 0xd8, 0xff], category: "image" },
    Signature { offset: 0, magic: b"GIF87a", category: "image" },
    Signature { offset: 0, magic: b"GIF89a", category: "image" },
    Signature { offset: 0, magic: b"II*\x00", category: "image" },
    Signature { offset: 0, magic: b"MM\x00*", category: "image" },
    Signature { offset: 0, magic: b"ID3", category: "audio" },
    Signature { offset: 0, magic: b"fLaC", category: "audio" },
    Signature { offset: 0, magic: b"OggS", category: "audio" },
    Signature { offset: 0, magic: &[0x1a, 0x45, 0xdf, 0xa3], category: "video" },
    Signature { offset: 0, magic: &[0x7f, b'E', b'L', b'F'], category: "executable" },
    Signature { offset: 0, magic: b"MZ", category: "executable" },
    Signature { offset: 0, magic: &[0xcf, 0xfa, 0xed, 0xfe], category: "executable" },
    Signature { offset: 0, magic: &[0xfe, 0xed, 0xfa, 0xcf], category: "executable" },
];

/// Category implied by the file's leading bytes, if any signature matches.
pub fn sniff(header: &[u8]) -> Option<&'static str> {
    SIGNATURES
        .iter()
        .find(|sig| {
            header
                .get(sig.offset..sig.offset + sig.magic.len())
                .is_some_and(|window| window == sig.magic)
        })
        .map(|sig| sig.category)
}

/// True when the header is a native executable image, whatever the name says.
pub fn is_executable(header: &[u8]) -> bool {
    sniff(header) == Some("executable")
}
