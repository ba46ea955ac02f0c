//! 符号集合と文字表。

use super::{DecodeError, Unsupported};

/// G0〜G3に指示できる符号集合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicSet {
    /// 漢字。2バイト符号。
    Kanji,
    /// 英数。1バイト符号。
    Alnum,
    /// 平仮名。JIS漢字4区の符号をそのまま用いる2バイト符号。
    Hiragana,
    /// 片仮名。JIS漢字5区の符号をそのまま用いる2バイト符号。
    Katakana,
    /// マクロ。1バイト符号。
    Macro,
    /// DRCS。0は2バイト符号、1〜15は1バイト符号。
    Drcs(u8),
}

impl GraphicSet {
    /// この集合の符号が占めるバイト数。
    #[inline]
    pub fn size(self) -> usize {
        match self {
            GraphicSet::Kanji | GraphicSet::Hiragana | GraphicSet::Katakana => 2,
            GraphicSet::Alnum | GraphicSet::Macro => 1,
            GraphicSet::Drcs(0) => 2,
            GraphicSet::Drcs(_) => 1,
        }
    }

    /// Gセットの終端符号から集合を得る。
    ///
    /// モザイク・プロポーショナル・JIS X 0201片仮名・JIS互換漢字・追加記号は
    /// 運用されないため[`Unsupported::EscForm`]で失敗する。
    pub fn from_term(term: u8) -> Result<GraphicSet, DecodeError> {
        match term {
            0x42 => Ok(GraphicSet::Kanji),
            0x4A => Ok(GraphicSet::Alnum),
            0x30 => Ok(GraphicSet::Hiragana),
            0x31 => Ok(GraphicSet::Katakana),
            _ => Err(Unsupported::EscForm.into()),
        }
    }

    /// DRCSの終端符号から集合を得る。
    pub fn from_drcs_term(term: u8) -> Result<GraphicSet, DecodeError> {
        match term {
            0x40..=0x4F => Ok(GraphicSet::Drcs(term - 0x40)),
            0x70 => Ok(GraphicSet::Macro),
            _ => Err(Unsupported::EscForm.into()),
        }
    }
}

/// マクロが指示するひとつの集合。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroRef {
    /// Gセットの終端符号による指示。
    Gset(u8),
    /// DRCSの終端符号による指示。
    Drcs(u8),
}

impl MacroRef {
    /// 指示内容を符号集合として解決する。
    #[inline]
    pub fn resolve(self) -> Result<GraphicSet, DecodeError> {
        match self {
            MacroRef::Gset(term) => GraphicSet::from_term(term),
            MacroRef::Drcs(term) => GraphicSet::from_drcs_term(term),
        }
    }
}

use MacroRef::{Drcs, Gset};

// 既定マクロ（0x60〜0x6F）がG0〜G3に指示する集合。
// 各マクロの符号列はLS0とLS2Rで終わるため、展開時はGL=G0・GR=G2に戻る。
static MACROS: [[MacroRef; 4]; 16] = [
    // 0x60
    [Gset(0x42), Gset(0x4A), Gset(0x30), Drcs(0x70)],
    // 0x61
    [Gset(0x42), Gset(0x31), Gset(0x30), Drcs(0x70)],
    // 0x62
    [Gset(0x42), Drcs(0x41), Gset(0x30), Drcs(0x70)],
    // 0x63〜0x65はモザイク集合を含む
    [Gset(0x32), Gset(0x34), Gset(0x35), Drcs(0x70)],
    [Gset(0x32), Gset(0x33), Gset(0x35), Drcs(0x70)],
    [Gset(0x32), Drcs(0x41), Gset(0x35), Drcs(0x70)],
    // 0x66〜0x6A：DRCS-1〜15を3枚ずつ
    [Drcs(0x41), Drcs(0x42), Drcs(0x43), Drcs(0x70)],
    [Drcs(0x44), Drcs(0x45), Drcs(0x46), Drcs(0x70)],
    [Drcs(0x47), Drcs(0x48), Drcs(0x49), Drcs(0x70)],
    [Drcs(0x4A), Drcs(0x4B), Drcs(0x4C), Drcs(0x70)],
    [Drcs(0x4D), Drcs(0x4E), Drcs(0x4F), Drcs(0x70)],
    // 0x6B〜0x6F：漢字とDRCS-2〜6の組
    [Gset(0x42), Drcs(0x42), Gset(0x30), Drcs(0x70)],
    [Gset(0x42), Drcs(0x43), Gset(0x30), Drcs(0x70)],
    [Gset(0x42), Drcs(0x44), Gset(0x30), Drcs(0x70)],
    [Gset(0x42), Drcs(0x45), Gset(0x30), Drcs(0x70)],
    [Gset(0x42), Drcs(0x46), Gset(0x30), Drcs(0x70)],
];

/// 既定マクロの指示内容を返す。未定義の符号では`None`を返す。
#[inline]
pub fn macro_entry(key: u16) -> Option<&'static [MacroRef; 4]> {
    if (0x60..=0x6F).contains(&key) {
        Some(&MACROS[(key - 0x60) as usize])
    } else {
        None
    }
}

/// JIS X 0208系の2バイト符号をUnicode文字列へ変換する。
///
/// 未割り当ての符号は[`U+FFFD REPLACEMENT CHARACTER`][`char::REPLACEMENT_CHARACTER`]になる。
pub fn decode_jis(key: u16) -> String {
    let bytes = [(key >> 8) as u8 | 0x80, key as u8 | 0x80];
    let (text, had_errors) = encoding_rs::EUC_JP.decode_without_bom_handling(&bytes);
    if had_errors {
        log::trace!("unassigned kanji code: 0x{key:04X}");
    }
    text.into_owned()
}

/// 英数の1バイト符号をUnicode文字列へ変換する。
#[inline]
pub fn decode_alnum(key: u16) -> String {
    char::from(key as u8).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphic_set_size() {
        assert_eq!(GraphicSet::Kanji.size(), 2);
        assert_eq!(GraphicSet::Hiragana.size(), 2);
        assert_eq!(GraphicSet::Katakana.size(), 2);
        assert_eq!(GraphicSet::Alnum.size(), 1);
        assert_eq!(GraphicSet::Macro.size(), 1);
        assert_eq!(GraphicSet::Drcs(0).size(), 2);
        assert_eq!(GraphicSet::Drcs(1).size(), 1);
        assert_eq!(GraphicSet::Drcs(15).size(), 1);
    }

    #[test]
    fn test_from_term() {
        assert_eq!(GraphicSet::from_term(0x42).unwrap(), GraphicSet::Kanji);
        assert_eq!(GraphicSet::from_term(0x4A).unwrap(), GraphicSet::Alnum);
        assert_eq!(GraphicSet::from_term(0x30).unwrap(), GraphicSet::Hiragana);
        assert_eq!(GraphicSet::from_term(0x31).unwrap(), GraphicSet::Katakana);

        // モザイクA・プロポーショナル英数・JIS X 0201片仮名・追加記号
        for term in [0x32, 0x36, 0x49, 0x3B] {
            assert!(matches!(
                GraphicSet::from_term(term),
                Err(DecodeError::Unsupported(Unsupported::EscForm))
            ));
        }
    }

    #[test]
    fn test_from_drcs_term() {
        assert_eq!(
            GraphicSet::from_drcs_term(0x40).unwrap(),
            GraphicSet::Drcs(0)
        );
        assert_eq!(
            GraphicSet::from_drcs_term(0x41).unwrap(),
            GraphicSet::Drcs(1)
        );
        assert_eq!(
            GraphicSet::from_drcs_term(0x4F).unwrap(),
            GraphicSet::Drcs(15)
        );
        assert_eq!(GraphicSet::from_drcs_term(0x70).unwrap(), GraphicSet::Macro);
        assert!(GraphicSet::from_drcs_term(0x50).is_err());
    }

    #[test]
    fn test_macro_entry() {
        let entry = macro_entry(0x61).unwrap();
        assert_eq!(entry[0].resolve().unwrap(), GraphicSet::Kanji);
        assert_eq!(entry[1].resolve().unwrap(), GraphicSet::Katakana);
        assert_eq!(entry[2].resolve().unwrap(), GraphicSet::Hiragana);
        assert_eq!(entry[3].resolve().unwrap(), GraphicSet::Macro);

        // モザイクを含むマクロは解決できない
        let entry = macro_entry(0x63).unwrap();
        assert!(entry[0].resolve().is_err());

        assert_eq!(macro_entry(0x5F), None);
        assert_eq!(macro_entry(0x70), None);
    }

    #[test]
    fn test_decode_jis() {
        // 全角スペース
        assert_eq!(decode_jis(0x2121), "\u{3000}");
        // 平仮名と片仮名
        assert_eq!(decode_jis(0x2422), "あ");
        assert_eq!(decode_jis(0x2424), "い");
        assert_eq!(decode_jis(0x2522), "ア");
        // 漢字
        assert_eq!(decode_jis(0x3021), "亜");
        // 未割り当て
        assert_eq!(decode_jis(0x2200), "\u{FFFD}");
    }

    #[test]
    fn test_decode_alnum() {
        assert_eq!(decode_alnum(0x48), "H");
        assert_eq!(decode_alnum(0x7E), "~");
    }

    #[test]
    fn test_masking_equivalence() {
        // GR側の符号は最上位ビットを落とすとGL側と同じ表を引く
        fn key(pair: [u8; 2]) -> u16 {
            pair.iter()
                .fold(0u16, |key, &b| (key << 8) | (b & 0x7F) as u16)
        }

        for pair in [[0x30u8, 0x21], [0x24, 0x22], [0x25, 0x7E]] {
            let gr = [pair[0] | 0x80, pair[1] | 0x80];
            assert_eq!(key(pair), key(gr));
            assert_eq!(decode_jis(key(pair)), decode_jis(key(gr)));
        }
    }
}
