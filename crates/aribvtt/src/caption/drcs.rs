//! DRCS（外字）の取り込み。

use fxhash::FxHashMap;

use crate::utils::SliceExt;

use super::{DecodeError, Unsupported};

/// 取り込んだDRCSフォントひとつ分。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrcsGlyph {
    /// 横方向の画素数。
    pub width: u8,
    /// 縦方向の画素数。
    pub height: u8,
    /// 1画素あたりのビット数。
    pub depth: u8,
    /// ビットマップのバイト列。
    pub data: Vec<u8>,
}

/// 字幕文ひとつ分のDRCS登録簿。
///
/// スロット0は2バイト符号、スロット1〜15は1バイト符号で引かれる。
#[derive(Debug, Default)]
pub struct DrcsRegistry {
    slots: [FxHashMap<u16, DrcsGlyph>; 16],
}

impl DrcsRegistry {
    /// スロット`slot`の符号`code`に登録されたフォントを返す。
    #[inline]
    pub fn get(&self, slot: u8, code: u16) -> Option<&DrcsGlyph> {
        self.slots.get(slot as usize)?.get(&code)
    }

    /// DRCSデータユニットを取り込む。
    ///
    /// `size`は符号のバイト数で1または2。ジオメトリック図形は運用されないため
    /// [`Unsupported::DrcsGeometry`]で失敗する。
    pub fn ingest(&mut self, size: u8, data: &[u8]) -> Result<(), DecodeError> {
        // NumberOfCodeは読み飛ばし、レコード列は領域の終端まで走査する
        let Some(mut data) = data.get(1..) else {
            return Err(DecodeError::Truncated);
        };

        while !data.is_empty() {
            let &[hi, lo, number_of_font, ref rest @ ..] = data else {
                return Err(DecodeError::Truncated);
            };
            data = rest;

            let (slot, code) = match size {
                1 => ((hi & 0x0F), (lo & 0x7F) as u16),
                _ => (0, ((hi as u16) << 8 | lo as u16) & 0x7F7F),
            };

            for _ in 0..number_of_font {
                let &[font, depth, width, height, ref body @ ..] = data else {
                    return Err(DecodeError::Truncated);
                };

                // 上位4ビットはfontId
                let mode = font & 0x0F;
                if mode != 0b0000 && mode != 0b0001 {
                    // ジオメトリック図形
                    return Err(Unsupported::DrcsGeometry.into());
                }

                let depth_bits = bits_per_pixel(depth);
                let length = width as usize * height as usize * depth_bits / 8;
                let Some((bitmap, rest)) = body.split_at_checked(length) else {
                    return Err(DecodeError::Truncated);
                };
                data = rest;

                self.slots[slot as usize].insert(
                    code,
                    DrcsGlyph {
                        width,
                        height,
                        depth: depth_bits as u8,
                        data: bitmap.to_vec(),
                    },
                );
            }
        }

        Ok(())
    }
}

/// 階調数`depth + 2`を表現するのに必要な1画素あたりのビット数。
fn bits_per_pixel(depth: u8) -> usize {
    let levels = depth as u32 + 2;
    (u32::BITS - (levels - 1).leading_zeros()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_per_pixel() {
        // 2階調は1ビット、4階調は2ビット
        assert_eq!(bits_per_pixel(0), 1);
        assert_eq!(bits_per_pixel(1), 2);
        assert_eq!(bits_per_pixel(2), 2);
        // 5階調は3ビットに切り上げる
        assert_eq!(bits_per_pixel(3), 3);
        assert_eq!(bits_per_pixel(6), 3);
        assert_eq!(bits_per_pixel(14), 4);
    }

    #[test]
    fn test_ingest_single_byte() {
        // DRCS-1の符号0x21へ8x8・1ビットのフォントを登録する
        let mut data = vec![
            0x01, // NumberOfCode
            0x41, 0x21, // CharacterCode
            0x01, // NumberOfFont
            0x00, // fontId=0, mode=0
            0x00, 0x08, 0x08, // depth, width, height
        ];
        data.extend_from_slice(&[0xAA; 8]);

        let mut registry = DrcsRegistry::default();
        registry.ingest(1, &data).unwrap();

        let glyph = registry.get(1, 0x21).unwrap();
        assert_eq!((glyph.width, glyph.height, glyph.depth), (8, 8, 1));
        assert_eq!(glyph.data, vec![0xAA; 8]);
        // ビットマップ長の不変条件
        assert_eq!(
            glyph.data.len() * 8,
            glyph.width as usize * glyph.height as usize * glyph.depth as usize,
        );

        assert_eq!(registry.get(1, 0x22), None);
        assert_eq!(registry.get(2, 0x21), None);
    }

    #[test]
    fn test_ingest_double_byte() {
        // 2バイトDRCSはスロット0に入る
        let mut data = vec![
            0x01, // NumberOfCode
            0xA1, 0xA1, // CharacterCode（最上位ビットは落とされる）
            0x01, // NumberOfFont
            0x01, // fontId=0, mode=1
            0x02, 0x04, 0x04, // 4階調、4x4
        ];
        data.extend_from_slice(&[0x55; 4]);

        let mut registry = DrcsRegistry::default();
        registry.ingest(2, &data).unwrap();

        let glyph = registry.get(0, 0x2121).unwrap();
        assert_eq!((glyph.width, glyph.height, glyph.depth), (4, 4, 2));
        assert_eq!(glyph.data.len(), 4);
    }

    #[test]
    fn test_ingest_multiple_fonts() {
        // ひとつの符号に複数フォントがある場合は最後の登録が残る
        let mut data = vec![0x01, 0x42, 0x30, 0x02];
        data.extend_from_slice(&[0x00, 0x00, 0x08, 0x08]);
        data.extend_from_slice(&[0x11; 8]);
        data.extend_from_slice(&[0x10, 0x00, 0x08, 0x08]);
        data.extend_from_slice(&[0x22; 8]);

        let mut registry = DrcsRegistry::default();
        registry.ingest(1, &data).unwrap();
        assert_eq!(registry.get(2, 0x30).unwrap().data, vec![0x22; 8]);
    }

    #[test]
    fn test_ingest_geometric() {
        let data = [0x01, 0x41, 0x21, 0x01, 0x02, 0x00, 0x08, 0x08];
        let mut registry = DrcsRegistry::default();
        assert!(matches!(
            registry.ingest(1, &data),
            Err(DecodeError::Unsupported(Unsupported::DrcsGeometry))
        ));
    }

    #[test]
    fn test_ingest_truncated() {
        let data = [0x01, 0x41, 0x21, 0x01, 0x00, 0x00, 0x08, 0x08, 0xAA];
        let mut registry = DrcsRegistry::default();
        assert!(matches!(
            registry.ingest(1, &data),
            Err(DecodeError::Truncated)
        ));

        assert!(matches!(
            registry.ingest(1, &[]),
            Err(DecodeError::Truncated)
        ));
    }
}
