//! MPEG-2 Systemsで規定されるテーブル。

use std::num::NonZeroU16;

use crate::desc::{DescriptorBlock, StreamType};
use crate::pid::Pid;
use crate::psi::PsiSection;
use crate::utils::BytesExt;

/// PMTのあるPIDの定義。
#[derive(Debug)]
pub struct PatProgram {
    /// 放送番組番号識別。
    pub program_number: NonZeroU16,
    /// PMTのPID。
    pub program_map_pid: Pid,
}

/// PAT（Program Association Table）。
#[derive(Debug)]
pub struct Pat {
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,

    /// NITのPID。
    pub network_pid: Pid,

    /// PMTのPIDを格納する配列。
    pub pmts: Vec<PatProgram>,
}

impl Pat {
    /// PATのテーブルID。
    pub const TABLE_ID: u8 = 0x00;

    /// `psi`から`Pat`を読み取る。
    pub fn read(psi: &PsiSection) -> Option<Pat> {
        if psi.table_id != Pat::TABLE_ID {
            log::debug!("invalid Pat::table_id");
            return None;
        }
        let Some(syntax) = psi.syntax.as_ref() else {
            log::debug!("invalid Pat::syntax");
            return None;
        };

        let transport_stream_id = syntax.table_id_extension;

        let mut network_pid = Pid::default();
        let mut pmts = Vec::new();
        for chunk in psi.data.chunks_exact(4) {
            let program_number = chunk[0..=1].read_be_16();
            let pid = Pid::read(&chunk[2..=3]);

            if let Some(program_number) = NonZeroU16::new(program_number) {
                // PMT
                pmts.push(PatProgram {
                    program_number,
                    program_map_pid: pid,
                });
            } else {
                // NIT
                network_pid = pid;
            }
        }

        Some(Pat {
            transport_stream_id,
            network_pid,
            pmts,
        })
    }
}

/// 各サービスを構成するストリームのPIDの定義。
#[derive(Debug)]
pub struct PmtStream<'a> {
    /// ストリーム形式種別。
    pub stream_type: StreamType,
    /// エレメンタリーPID。
    pub elementary_pid: Pid,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

/// PMT（Program Map Table）。
#[derive(Debug)]
pub struct Pmt<'a> {
    /// 放送番組番号識別。
    pub program_number: u16,
    /// PCRのPID。
    pub pcr_pid: Pid,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
    /// ストリームのPIDを格納する配列。
    pub streams: Vec<PmtStream<'a>>,
}

impl<'a> Pmt<'a> {
    /// PMTのテーブルID。
    pub const TABLE_ID: u8 = 0x02;

    /// `psi`から`Pmt`を読み取る。
    pub fn read(psi: &PsiSection<'a>) -> Option<Pmt<'a>> {
        if psi.table_id != Pmt::TABLE_ID {
            log::debug!("invalid Pmt::table_id");
            return None;
        }
        let Some(syntax) = psi.syntax.as_ref() else {
            log::debug!("invalid Pmt::syntax");
            return None;
        };

        let data = psi.data;
        if data.len() < 4 {
            log::debug!("invalid Pmt");
            return None;
        }

        let program_number = syntax.table_id_extension;
        let pcr_pid = Pid::read(&data[0..=1]);
        let Some((descriptors, mut data)) = DescriptorBlock::read(&data[2..]) else {
            log::debug!("invalid Pmt::descriptors");
            return None;
        };

        let mut streams = Vec::new();
        while !data.is_empty() {
            if data.len() < 5 {
                log::debug!("invalid PmtStream");
                return None;
            }

            let stream_type = StreamType(data[0]);
            let elementary_pid = Pid::read(&data[1..=2]);
            let Some((descriptors, rem)) = DescriptorBlock::read(&data[3..]) else {
                log::debug!("invalid PmtStream::descriptors");
                return None;
            };
            data = rem;

            streams.push(PmtStream {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Some(Pmt {
            program_number,
            pcr_pid,
            descriptors,
            streams,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::tests::build_section;

    #[test]
    fn test_pat() {
        // NITと2つのプログラム
        let data = [
            0x00, 0x00, 0xE0, 0x10, // NIT
            0x04, 0x08, 0xE1, 0x01, // program 0x0408 -> PMT 0x0101
            0x04, 0x09, 0xE1, 0x02, // program 0x0409 -> PMT 0x0102
        ];
        let buf = build_section(0x00, 0x7FE0, &data);
        let psi = PsiSection::parse(&buf).unwrap();
        let pat = Pat::read(&psi).unwrap();

        assert_eq!(pat.transport_stream_id, 0x7FE0);
        assert_eq!(pat.network_pid, Pid::new(0x0010));
        assert_eq!(pat.pmts.len(), 2);
        assert_eq!(pat.pmts[0].program_number.get(), 0x0408);
        assert_eq!(pat.pmts[0].program_map_pid, Pid::new(0x0101));
        assert_eq!(pat.pmts[1].program_map_pid, Pid::new(0x0102));

        // PMTのセクションをPATとしては読めない
        let buf = build_section(0x02, 0x0408, &data);
        let psi = PsiSection::parse(&buf).unwrap();
        assert!(Pat::read(&psi).is_none());
    }

    #[test]
    fn test_pmt() {
        let data = [
            0xE1, 0x11, // PCR PID
            0xF0, 0x00, // program_info_length = 0
            0x02, 0xE1, 0x12, 0xF0, 0x00, // 映像
            0x06, 0xE1, 0x30, 0xF0, 0x05, 0x52, 0x01, 0x30, 0xC1, 0x00, // 字幕
        ];
        let buf = build_section(0x02, 0x0408, &data);
        let psi = PsiSection::parse(&buf).unwrap();
        let pmt = Pmt::read(&psi).unwrap();

        assert_eq!(pmt.program_number, 0x0408);
        assert_eq!(pmt.pcr_pid, Pid::new(0x0111));
        assert_eq!(pmt.streams.len(), 2);
        assert_eq!(pmt.streams[0].stream_type, StreamType(0x02));
        assert_eq!(pmt.streams[1].stream_type, StreamType::CAPTION);
        assert_eq!(pmt.streams[1].elementary_pid, Pid::new(0x0130));
        assert_eq!(pmt.streams[1].descriptors.component_tag(), Some(0x30));
    }
}
