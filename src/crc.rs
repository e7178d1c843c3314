/// Byte-wise CRC table (polynomial 0xEDB88320) feeding the match-finder hash.
const CRC_POLY: u32 = 0xEDB8_8320;

const fn make_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
}

pub(crate) static CRC_TABLE: [u32; 256] = make_table();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_known_entries() {
        assert_eq!(CRC_TABLE[0], 0);
        assert_eq!(CRC_TABLE[1], 0x7707_3096);
        assert_eq!(CRC_TABLE[128], 0xEDB8_8320);
        assert_eq!(CRC_TABLE[255], 0x2D02_EF8D);
    }
}
