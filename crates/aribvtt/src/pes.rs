//! PESパケット。

use thiserror::Error;

use crate::time::Timestamp;
use crate::utils::BytesExt;

/// ストリーム識別子。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub u8);

impl StreamId {
    /// プライベートストリーム1。字幕はこのストリームで運用される。
    pub const PRIVATE_STREAM_1: StreamId = StreamId(0xBD);

    fn has_additional_header(self) -> bool {
        // program_stream_map・padding_stream・private_stream_2・
        // ECM・EMM・DSMCC・H.222.1 type E・program_stream_directory以外は
        // フラグ類を含む追加ヘッダを持つ
        !matches!(
            self.0,
            0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xF2 | 0xF8 | 0xFF
        )
    }
}

/// [`PesPacket::parse`]で発生するエラー。
#[derive(Debug, Error)]
pub enum PesError {
    /// PESパケットの長さが足りない。
    #[error("insufficient length of a PES packet")]
    InsufficientLength,

    /// PESパケットの開始コードが不正。
    #[error("invalid start code")]
    InvalidStartCode,

    /// PESパケットに最低限必要なバイト数がなく、壊れたパケットである。
    #[error("corrupt packet")]
    Corrupted,
}

/// PESのヘッダ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesHeader {
    /// ストリーム識別子。
    pub stream_id: StreamId,

    /// PESヘッダオプション。
    pub option: Option<PesHeaderOption>,
}

/// PESヘッダオプション。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesHeaderOption {
    /// スクランブリングモード（2ビット）。
    pub pes_scrambling_control: u8,
    /// PESヘッダの直後に同期語が続くかどうか。
    pub data_alignment_indicator: bool,
    /// PESパケットヘッダにPTSフィールド、DTSフィールドが存在するかどうかを示す（2ビット）。
    pub pts_dts_flags: u8,
    /// PESパケットヘッダに含まれるオプションフィールド及びスタッフィングバイトの全バイト数。
    pub pes_header_data_length: u8,
}

/// PESのパケット。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesPacket<'a> {
    /// PESのヘッダ。
    pub header: PesHeader,

    /// パケット全体のバイト列。開始コードを含む。
    pub bytes: &'a [u8],

    /// ヘッダを除いたPESのデータ。
    pub data: &'a [u8],
}

impl<'a> PesPacket<'a> {
    /// PESパケットをパースして[`PesPacket`]として返す。
    pub fn parse(data: &'a [u8]) -> Result<PesPacket<'a>, PesError> {
        if data.len() < 6 {
            return Err(PesError::InsufficientLength);
        }

        if data[0..=2] != [0x00, 0x00, 0x01] {
            return Err(PesError::InvalidStartCode);
        }
        let pes_packet_length = data[4..=5].read_be_16();
        let Some(data) = data.get(..6 + pes_packet_length as usize) else {
            return Err(PesError::InsufficientLength);
        };

        let stream_id = StreamId(data[3]);

        let (option, mid) = if stream_id.has_additional_header() {
            if data.len() < 9 {
                return Err(PesError::Corrupted);
            }

            let option = PesHeaderOption {
                pes_scrambling_control: (data[6] & 0b00110000) >> 4,
                data_alignment_indicator: data[6] & 0b00000100 != 0,
                pts_dts_flags: (data[7] & 0b11000000) >> 6,
                pes_header_data_length: data[8],
            };

            let mid = 9 + option.pes_header_data_length as usize;
            if data.len() < mid {
                return Err(PesError::Corrupted);
            }

            (Some(option), mid)
        } else {
            (None, 6)
        };

        let header = PesHeader { stream_id, option };

        Ok(PesPacket {
            header,
            bytes: data,
            data: &data[mid..],
        })
    }

    /// PESヘッダに含まれるPTSを返す。
    ///
    /// PTSフィールドを持たないパケットでは`None`を返す。
    pub fn pts(&self) -> Option<Timestamp> {
        let option = self.header.option.as_ref()?;
        if option.pts_dts_flags & 0b10 == 0 {
            return None;
        }

        let data: &[u8; 5] = self.bytes.get(9..9 + 5)?.try_into().unwrap();
        Some(Timestamp::read_pts(data))
    }
}
