//! PSIセクション。

use thiserror::Error;

use crate::utils::BytesExt;

/// [`PsiSection::parse`]で発生するエラー。
///
/// セクション長が確定したあとで発生するエラーにはセクション長が付随する。
#[derive(Debug, Error)]
pub enum PsiError {
    /// PSIセクションの長さが足りない。
    #[error("insufficient length of a PSI section")]
    InsufficientLength,

    /// PSIの終端に到達した。
    #[error("reached to end of PSI sections")]
    EndOfPsi,

    /// PSIセクションに最低限必要なバイト数がなく、壊れたセクションである。
    #[error("corrupt section")]
    Corrupted(usize),

    /// PSIセクションのCRC32が一致しない。
    #[error("crc32 error")]
    Crc32(usize),
}

/// PSIのセクション。
#[derive(Debug)]
pub struct PsiSection<'a> {
    /// テーブル識別。
    pub table_id: u8,
    /// セクションシンタクス指示。
    pub section_syntax_indicator: bool,
    /// セクション長（12ビット）。
    pub section_length: u16,

    /// 拡張セクションヘッダ。
    pub syntax: Option<SyntaxSection>,

    /// セクションのデータ。
    pub data: &'a [u8],
    /// セクションのCRC32。
    pub crc32: u32,
}

/// PSIの拡張セクションヘッダ。
#[derive(Debug)]
pub struct SyntaxSection {
    /// テーブル識別拡張。
    pub table_id_extension: u16,
    /// バージョン番号（5ビット）。
    pub version_number: u8,
    /// カレントネクスト指示。
    pub current_next_indicator: bool,
    /// セクション番号。
    pub section_number: u8,
    /// 最終セクション番号。
    pub last_section_number: u8,
}

impl<'a> PsiSection<'a> {
    /// PSIセクションをパースして[`PsiSection`]として返す。
    pub fn parse(buf: &'a [u8]) -> Result<PsiSection<'a>, PsiError> {
        if buf.len() < 3 {
            return Err(PsiError::InsufficientLength);
        }

        let table_id = buf[0];
        if table_id == 0xFF {
            return Err(PsiError::EndOfPsi);
        }
        let section_syntax_indicator = buf[1] & 0b10000000 != 0;
        let section_length = buf[1..].read_be_16() & 0b0000_1111_1111_1111;

        let Some(psi) = buf.get(..3 + section_length as usize) else {
            return Err(PsiError::InsufficientLength);
        };

        if !crate::crc32::calc(psi) {
            return Err(PsiError::Crc32(psi.len()));
        }

        let (syntax, data) = if section_syntax_indicator {
            if psi.len() < 3 + 5 + 4 {
                return Err(PsiError::Corrupted(psi.len()));
            }

            let syntax = SyntaxSection {
                table_id_extension: psi[3..].read_be_16(),
                version_number: (psi[5] & 0b00111110) >> 1,
                current_next_indicator: psi[5] & 0b00000001 != 0,
                section_number: psi[6],
                last_section_number: psi[7],
            };
            (Some(syntax), &psi[8..psi.len() - 4])
        } else {
            if psi.len() < 3 + 4 {
                return Err(PsiError::Corrupted(psi.len()));
            }

            (None, &psi[3..psi.len() - 4])
        };

        let crc32 = psi[psi.len() - 4..].read_be_32();

        Ok(PsiSection {
            table_id,
            section_syntax_indicator,
            section_length,

            syntax,

            data,
            crc32,
        })
    }

    /// このセクション全体の長さを返す。
    #[inline]
    pub fn total_len(&self) -> usize {
        3 + self.section_length as usize
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 拡張セクションヘッダ付きのPSIセクションを組み立てる。
    pub(crate) fn build_section(table_id: u8, table_id_extension: u16, data: &[u8]) -> Vec<u8> {
        let section_length = 5 + data.len() + 4;
        let mut buf = vec![table_id];
        buf.extend_from_slice(&u16::to_be_bytes(0xB000 | section_length as u16));
        buf.extend_from_slice(&u16::to_be_bytes(table_id_extension));
        buf.extend_from_slice(&[0b11000001, 0x00, 0x00]);
        buf.extend_from_slice(data);
        let crc = crate::crc32::checksum(&buf);
        buf.extend_from_slice(&crc.to_be_bytes());
        buf
    }

    #[test]
    fn test_psi_parse() {
        let buf = build_section(0x42, 0x1234, b"\xAB\xCD");
        let psi = PsiSection::parse(&buf).unwrap();

        assert_eq!(psi.table_id, 0x42);
        assert!(psi.section_syntax_indicator);
        assert_eq!(psi.total_len(), buf.len());
        let syntax = psi.syntax.as_ref().unwrap();
        assert_eq!(syntax.table_id_extension, 0x1234);
        assert_eq!(syntax.version_number, 0);
        assert!(syntax.current_next_indicator);
        assert_eq!(psi.data, b"\xAB\xCD");
    }

    #[test]
    fn test_psi_parse_err() {
        assert!(matches!(
            PsiSection::parse(&[]),
            Err(PsiError::InsufficientLength)
        ));
        assert!(matches!(
            PsiSection::parse(&[0xFF, 0xFF, 0xFF]),
            Err(PsiError::EndOfPsi)
        ));

        let mut buf = build_section(0x42, 0x1234, b"\xAB\xCD");
        buf[3] ^= 0x01;
        assert!(matches!(PsiSection::parse(&buf), Err(PsiError::Crc32(_))));

        let buf = build_section(0x42, 0x1234, b"\xAB\xCD");
        assert!(matches!(
            PsiSection::parse(&buf[..buf.len() - 1]),
            Err(PsiError::InsufficientLength)
        ));
    }
}
