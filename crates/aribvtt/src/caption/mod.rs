//! ARIB STD-B24第一編で規定される字幕の復号。
//!
//! 字幕PESひとつを[`CaptionDecoder`]で復号すると、平文テキストと
//! バイト範囲のスパンを残したスタイル付き出力、表示終了時刻が得られる。

mod charset;
mod decode;
mod drcs;
mod layout;

pub mod palette;

pub use charset::{GraphicSet, MacroRef};
pub use decode::CaptionDecoder;
pub use drcs::{DrcsGlyph, DrcsRegistry};
pub use layout::{LayoutState, TextSize};

use std::fmt;

use thiserror::Error;

/// 字幕文の復号で発生するエラー。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// 文法上は正しいが運用されない・未対応の構造。
    #[error("unsupported {0}")]
    Unsupported(Unsupported),

    /// 供給されたバイト列の範囲外を参照した。
    #[error("truncated caption data")]
    Truncated,
}

/// [`DecodeError::Unsupported`]が示す未対応の構造。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsupported {
    /// ビットマップのデータユニット。
    Bitmap,
    /// 未知のデータユニット。
    DataUnit,
    /// ジオメトリックDRCS。
    DrcsGeometry,
    /// SZX、指定サイズ。
    Szx,
    /// CDC、コンシールメント。
    Cdc,
    /// POL、パターン極性。
    Pol,
    /// WMM、書込みモード変更。
    Wmm,
    /// MACRO、マクロ定義。
    Macro,
    /// RPC、文字繰り返し。
    Rpc,
    /// 未対応のCSI終端符号。
    CsiOpcode(u8),
    /// 未対応のSWF書式。
    SwfValue,
    /// 未対応のエスケープ列または符号集合。
    EscForm,
    /// 未対応の制御符号。
    Byte(u8),
}

impl From<Unsupported> for DecodeError {
    #[inline]
    fn from(value: Unsupported) -> DecodeError {
        DecodeError::Unsupported(value)
    }
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Unsupported::Bitmap => f.write_str("bitmap data unit"),
            Unsupported::DataUnit => f.write_str("unknown data unit"),
            Unsupported::DrcsGeometry => f.write_str("geometric DRCS"),
            Unsupported::Szx => f.write_str("SZX"),
            Unsupported::Cdc => f.write_str("CDC"),
            Unsupported::Pol => f.write_str("POL"),
            Unsupported::Wmm => f.write_str("WMM"),
            Unsupported::Macro => f.write_str("MACRO"),
            Unsupported::Rpc => f.write_str("RPC"),
            Unsupported::CsiOpcode(op) => write!(f, "CSI opcode 0x{op:02X}"),
            Unsupported::SwfValue => f.write_str("SWF value"),
            Unsupported::EscForm => f.write_str("escape form"),
            Unsupported::Byte(byte) => write!(f, "byte 0x{byte:02X}"),
        }
    }
}
