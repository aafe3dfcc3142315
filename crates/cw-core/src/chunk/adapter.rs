//! Source adapter: unify AST offsets and answer O(1) non-whitespace counts.
//!
//! Parsers disagree about what an offset means: tree-sitter reports UTF-8
//! byte offsets while 16-bit-string parsers report UTF-16 code units. The
//! adapter detects which domain an AST uses from its root end offset,
//! translates offsets both ways, and carries a prefix-sum over
//! non-whitespace (NWS) units so chunk budgeting never rescans text.

/// Which offset domain an AST's indexes live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexDomain {
    /// Offsets are UTF-16 code units.
    Utf16,
    /// Offsets are UTF-8 bytes.
    Utf8,
    /// Neither matched; the splitter falls back to plain-text splitting.
    Unknown,
}

/// Offset translation + NWS prefix sums for one source text.
pub struct SourceAdapter<'a> {
    source: &'a str,
    domain: IndexDomain,
    /// Byte offset -> UTF-16 unit offset. Interior bytes of a multi-byte
    /// sequence map to the sequence's starting unit, so any byte offset
    /// rounds down to a valid boundary. Length: bytes + 1.
    byte_to_unit: Vec<u32>,
    /// UTF-16 unit offset -> byte offset of the containing scalar.
    /// Length: units + 1.
    unit_to_byte: Vec<u32>,
    /// NWS prefix sums over UTF-16 units. Length: units + 1.
    nws_prefix: Vec<u32>,
}

impl<'a> SourceAdapter<'a> {
    /// Build an adapter, detecting the domain from the AST root's end offset.
    pub fn new(source: &'a str, ast_root_end_index: usize) -> Self {
        let bytes = source.len();
        let mut byte_to_unit = vec![0u32; bytes + 1];
        let mut unit_to_byte = Vec::new();
        let mut nws_prefix = vec![0u32];

        let mut unit: u32 = 0;
        for (byte_idx, ch) in source.char_indices() {
            let blen = ch.len_utf8();
            let ulen = ch.len_utf16();
            for k in 0..blen {
                byte_to_unit[byte_idx + k] = unit;
            }
            let contrib = u32::from(!matches!(ch, ' ' | '\t' | '\n' | '\r'));
            for _ in 0..ulen {
                unit_to_byte.push(byte_idx as u32);
                let prev = *nws_prefix.last().unwrap_or(&0);
                nws_prefix.push(prev + contrib);
            }
            unit += ulen as u32;
        }
        byte_to_unit[bytes] = unit;
        unit_to_byte.push(bytes as u32);

        let units = unit as usize;
        let domain = if ast_root_end_index == units {
            IndexDomain::Utf16
        } else if ast_root_end_index == bytes {
            IndexDomain::Utf8
        } else {
            IndexDomain::Unknown
        };

        Self {
            source,
            domain,
            byte_to_unit,
            unit_to_byte,
            nws_prefix,
        }
    }

    /// The detected offset domain.
    pub fn domain(&self) -> IndexDomain {
        self.domain
    }

    /// Total UTF-16 units in the source.
    pub fn total_units(&self) -> usize {
        self.unit_to_byte.len() - 1
    }

    /// Total bytes in the source.
    pub fn total_bytes(&self) -> usize {
        self.source.len()
    }

    /// File end in the AST's own domain.
    pub fn end_index(&self) -> usize {
        match self.domain {
            IndexDomain::Utf8 => self.total_bytes(),
            _ => self.total_units(),
        }
    }

    /// Convert an AST-domain offset to UTF-16 units, clamped.
    pub fn to_units(&self, offset: usize) -> usize {
        match self.domain {
            IndexDomain::Utf8 => {
                let clamped = offset.min(self.source.len());
                self.byte_to_unit[clamped] as usize
            }
            _ => offset.min(self.total_units()),
        }
    }

    /// Convert an AST-domain offset to a byte offset, rounded down to a
    /// char boundary, clamped.
    pub fn to_bytes(&self, offset: usize) -> usize {
        match self.domain {
            IndexDomain::Utf8 => {
                let mut clamped = offset.min(self.source.len());
                while clamped > 0 && !self.source.is_char_boundary(clamped) {
                    clamped -= 1;
                }
                clamped
            }
            _ => {
                let clamped = offset.min(self.total_units());
                self.unit_to_byte[clamped] as usize
            }
        }
    }

    /// Slice the source between two AST-domain offsets.
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        let (b_start, b_end) = (self.to_bytes(start), self.to_bytes(end));
        if b_start >= b_end {
            return "";
        }
        &self.source[b_start..b_end]
    }

    /// NWS count between two AST-domain offsets.
    pub fn nws(&self, start: usize, end: usize) -> u32 {
        let (u_start, u_end) = (self.to_units(start), self.to_units(end));
        if u_start >= u_end {
            return 0;
        }
        self.nws_prefix[u_end] - self.nws_prefix[u_start]
    }

    /// NWS count of the whole source.
    pub fn total_nws(&self) -> u32 {
        *self.nws_prefix.last().unwrap_or(&0)
    }

    /// UTF-16 unit offset for an explicit byte offset, independent of the
    /// detected domain. Used by the plain-text fallback, which always works
    /// in bytes.
    pub fn units_at_byte(&self, byte: usize) -> usize {
        let clamped = byte.min(self.source.len());
        self.byte_to_unit[clamped] as usize
    }

    /// NWS count between two explicit byte offsets, independent of the
    /// detected domain.
    pub fn nws_between_bytes(&self, start_byte: usize, end_byte: usize) -> u32 {
        let (u_start, u_end) = (self.units_at_byte(start_byte), self.units_at_byte(end_byte));
        if u_start >= u_end {
            return 0;
        }
        self.nws_prefix[u_end] - self.nws_prefix[u_start]
    }
}
