//! ARIB STD-B24の字幕をMPEG2-TSから取り出してWebVTTへ変換するためのクレート。
//!
//! 中心となるのは[`caption::CaptionDecoder`]で、字幕PESひとつを受け取り
//! 平文テキスト・スタイル付き出力・表示終了時刻を生成する。周辺には
//! TSパケットの読み込みと分離、PAT/PMTの解析、PCRとPTSによる時刻合わせ、
//! WebVTT文書の書き出しを備える。

#![deny(missing_docs)]

pub mod caption;
pub mod crc32;
pub mod demux;
pub mod desc;
pub mod packet;
pub mod pes;
pub mod pid;
pub mod psi;
pub mod table;
pub mod time;
pub mod vtt;
mod utils;

pub use packet::Packet;
pub use pid::Pid;
