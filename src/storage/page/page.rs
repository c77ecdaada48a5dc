use byteorder::{ByteOrder, LittleEndian};

/// Byte footprint of an i32 on a page.
pub const INT_SIZE: usize = 4;

/// Byte footprint of one UTF-16 code unit on a page.
pub const UTF16_UNIT_SIZE: usize = 2;

/// On-page footprint of a string of `units` UTF-16 code units: a 4-byte
/// length prefix followed by 2 bytes per code unit. Callers use this to
/// compute the next free offset after a string field.
pub fn max_length(units: usize) -> usize {
    INT_SIZE + units * UTF16_UNIT_SIZE
}

/// An in-memory image of one disk block, with typed accessors at arbitrary
/// byte offsets.
///
/// Offsets are caller-managed; the page does not track what lives where.
/// Accessing an offset that would run past the end of the page is a
/// programmer error and panics.
///
/// Wire formats:
/// - i32: 4 bytes, little-endian.
/// - byte slice: i32 length prefix, then the raw bytes.
/// - string: i32 length prefix counting *bytes*, then UTF-16 code units,
///   each little-endian. Surrogate pairs are preserved.
#[derive(Debug, Clone)]
pub struct Page {
    data: Vec<u8>,
}

impl Page {
    /// Create a zeroed page of `block_size` bytes.
    pub fn new(block_size: usize) -> Self {
        Self {
            data: vec![0; block_size],
        }
    }

    /// Wrap an existing byte buffer, e.g. a log record image.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn get_int(&self, offset: usize) -> i32 {
        LittleEndian::read_i32(&self.data[offset..offset + INT_SIZE])
    }

    /// Store `val` at `offset`. Returns the footprint of the value so the
    /// caller can compute the next free offset.
    pub fn set_int(&mut self, offset: usize, val: i32) -> usize {
        LittleEndian::write_i32(&mut self.data[offset..offset + INT_SIZE], val);
        INT_SIZE
    }

    pub fn get_bytes(&self, offset: usize) -> &[u8] {
        let len = self.get_int(offset) as usize;
        let from = offset + INT_SIZE;
        &self.data[from..from + len]
    }

    /// Store a length-prefixed byte slice at `offset`. Returns its footprint.
    pub fn set_bytes(&mut self, offset: usize, val: &[u8]) -> usize {
        self.set_int(offset, val.len() as i32);
        let from = offset + INT_SIZE;
        self.data[from..from + val.len()].copy_from_slice(val);
        INT_SIZE + val.len()
    }

    pub fn get_string(&self, offset: usize) -> String {
        let byte_len = self.get_int(offset) as usize;
        let units = byte_len / UTF16_UNIT_SIZE;
        let mut code_units = Vec::with_capacity(units);
        for i in 0..units {
            let from = offset + INT_SIZE + i * UTF16_UNIT_SIZE;
            code_units.push(LittleEndian::read_u16(&self.data[from..from + UTF16_UNIT_SIZE]));
        }
        String::from_utf16_lossy(&code_units)
    }

    /// Store a length-prefixed UTF-16 string at `offset`. Returns its
    /// footprint, which equals `max_length` of the string's code-unit count.
    pub fn set_string(&mut self, offset: usize, val: &str) -> usize {
        let code_units: Vec<u16> = val.encode_utf16().collect();
        self.set_int(offset, (code_units.len() * UTF16_UNIT_SIZE) as i32);
        for (i, unit) in code_units.iter().enumerate() {
            let from = offset + INT_SIZE + i * UTF16_UNIT_SIZE;
            LittleEndian::write_u16(&mut self.data[from..from + UTF16_UNIT_SIZE], *unit);
        }
        max_length(code_units.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_round_trip() {
        let mut page = Page::new(64);
        page.set_int(0, 42);
        page.set_int(4, -7);
        page.set_int(60, i32::MAX);

        assert_eq!(page.get_int(0), 42);
        assert_eq!(page.get_int(4), -7);
        assert_eq!(page.get_int(60), i32::MAX);
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut page = Page::new(64);
        let written = page.set_bytes(8, &[1, 2, 3, 4, 5]);

        assert_eq!(written, INT_SIZE + 5);
        assert_eq!(page.get_bytes(8), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_string_footprint_matches_max_length() {
        let mut page = Page::new(128);
        let written = page.set_string(0, "hello");

        assert_eq!(written, max_length(5));
        assert_eq!(page.get_string(0), "hello");
    }

    #[test]
    fn test_string_outside_basic_plane() {
        // A crab emoji occupies a surrogate pair: two code units, not one.
        let mut page = Page::new(128);
        let written = page.set_string(0, "ab🦀");

        assert_eq!(written, max_length(4));
        assert_eq!(page.get_string(0), "ab🦀");
    }

    #[test]
    fn test_empty_string() {
        let mut page = Page::new(16);
        assert_eq!(page.set_string(0, ""), max_length(0));
        assert_eq!(page.get_string(0), "");
    }
}
