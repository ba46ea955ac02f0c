//! MPEG2-TSのパケット。

use std::fmt;
use std::io::{self, BufRead};

use crate::pid::Pid;
use crate::time::Timestamp;

const SYNC_BYTE: u8 = 0x47;
const PACKET_SIZE: usize = 188;

/// MPEG2-TSのパケット。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Packet(pub [u8; PACKET_SIZE]);

impl Packet {
    /// `r`からTSパケットを順次読み込むイテレーターを生成する。
    #[inline]
    #[must_use]
    pub fn iter<R: BufRead>(r: R) -> PacketIter<R> {
        PacketIter { r }
    }

    /// `r`からTSパケットをひとつ読み込む。
    ///
    /// 同期バイトが現れるまで読み飛ばしてから188バイトを取り出す。
    /// 偽の同期位置を掴んだ場合は[`is_valid`](Packet::is_valid)で弾かれ、
    /// 次の読み込みで改めて同期し直される。
    pub fn read<R: BufRead>(r: &mut R) -> io::Result<Option<Packet>> {
        // 同期バイトまで読み飛ばす
        loop {
            let buf = r.fill_buf()?;
            if buf.is_empty() {
                return Ok(None);
            }
            match memchr::memchr(SYNC_BYTE, buf) {
                Some(pos) => {
                    r.consume(pos);
                    break;
                }
                None => {
                    let len = buf.len();
                    r.consume(len);
                }
            }
        }

        let mut packet = Packet([0; PACKET_SIZE]);
        match r.read_exact(&mut packet.0) {
            Ok(()) => Ok(Some(packet)),
            // パケットの途中でストリームが終わった
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// パケットとして成立しているかどうかを返す。
    ///
    /// 同期バイトと誤り指示に加え、規格上あり得ないPIDや制御値の
    /// 組み合わせも偽同期とみなして弾く。
    pub fn is_valid(&self) -> bool {
        self.0[0] == SYNC_BYTE
            && !self.error_indicator()
            && !matches!(self.pid().get(), 0x0002..=0x000F)
            && self.scrambling() != 0b01
            && match self.adaptation_control() {
                0b00 => false,
                0b10 => self.0[4] <= 183,
                0b11 => self.0[4] <= 182,
                _ => true,
            }
    }

    /// トランスポートエラーインジケーターを返す。
    #[inline]
    pub fn error_indicator(&self) -> bool {
        self.0[1] & 0b10000000 != 0
    }

    /// ペイロードユニット開始インジケーターを返す。
    #[inline]
    pub fn unit_start_indicator(&self) -> bool {
        self.0[1] & 0b01000000 != 0
    }

    /// PIDを返す。
    #[inline]
    pub fn pid(&self) -> Pid {
        Pid::read(&self.0[1..])
    }

    /// 連続性指標（4ビット）を返す。
    #[inline]
    pub fn continuity_counter(&self) -> u8 {
        self.0[3] & 0b00001111
    }

    /// パケットがスクランブル処理されているかを返す。
    #[inline]
    pub fn is_scrambled(&self) -> bool {
        self.scrambling() & 0b10 != 0
    }

    /// パケットがペイロードを含むかどうかを返す。
    #[inline]
    pub fn has_payload(&self) -> bool {
        self.adaptation_control() & 0b01 != 0
    }

    /// ペイロードを返す。
    pub fn payload(&self) -> Option<&[u8]> {
        if !self.has_payload() {
            return None;
        }

        let offset = if self.adaptation_control() & 0b10 != 0 {
            // アダプテーションフィールドの長さバイトと本体を飛ばす
            4 + 1 + self.0[4] as usize
        } else {
            4
        };
        self.0.get(offset..)
    }

    /// アダプテーションフィールドを返す。
    pub fn adaptation_field(&self) -> Option<AdaptationField> {
        if self.adaptation_control() & 0b10 == 0 {
            return None;
        }

        let length = self.0[4] as usize;
        if length == 0 {
            return None;
        }
        self.0.get(5..5 + length).map(AdaptationField)
    }

    /// トランスポートスクランブル制御（2ビット）。
    #[inline]
    fn scrambling(&self) -> u8 {
        (self.0[3] & 0b11000000) >> 6
    }

    /// アダプテーションフィールド制御（2ビット）。
    #[inline]
    fn adaptation_control(&self) -> u8 {
        (self.0[3] & 0b00110000) >> 4
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Packet")
            .field("pid", &self.pid())
            .field("error_indicator", &self.error_indicator())
            .field("unit_start_indicator", &self.unit_start_indicator())
            .field("continuity_counter", &self.continuity_counter())
            .finish_non_exhaustive()
    }
}

/// TSパケット内のアダプテーションフィールド。長さバイトを除いた本体を保持する。
#[derive(Debug)]
pub struct AdaptationField<'a>(&'a [u8]);

impl AdaptationField<'_> {
    /// 不連続性インジケーターを返す。
    #[inline]
    pub fn discontinuity_indicator(&self) -> bool {
        self.0[0] & 0b10000000 != 0
    }

    /// PCRを返す。PCRフラグが無い場合は`None`。
    pub fn pcr(&self) -> Option<Timestamp> {
        if self.0[0] & 0b00010000 == 0 {
            return None;
        }

        let data = self.0.get(1..1 + 6)?;
        Some(Timestamp::read_pcr(data.try_into().unwrap()))
    }
}

/// [`Packet::iter`]から返される、TSパケットを順次読み込むイテレーター。
#[derive(Debug)]
pub struct PacketIter<R> {
    r: R,
}

impl<R: BufRead> Iterator for PacketIter<R> {
    type Item = io::Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        Packet::read(&mut self.r).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// テスト用のTSパケットを組み立てる。
    fn build_packet(pid: u16, cc: u8, unit_start: bool, af: Option<&[u8]>, payload: &[u8]) -> Packet {
        let mut buf = [0xFFu8; PACKET_SIZE];
        buf[0] = SYNC_BYTE;
        buf[1] = (pid >> 8) as u8;
        if unit_start {
            buf[1] |= 0x40;
        }
        buf[2] = pid as u8;

        let mut pos = 4;
        buf[3] = cc & 0x0F;
        if let Some(af) = af {
            buf[3] |= 0b00110000;
            buf[4] = af.len() as u8;
            buf[5..5 + af.len()].copy_from_slice(af);
            pos = 5 + af.len();
        } else {
            buf[3] |= 0b00010000;
        }
        buf[pos..pos + payload.len()].copy_from_slice(payload);

        Packet(buf)
    }

    /// 90kHzの`base`をPCRフィールドに詰める。拡張部は0。
    fn pcr_bytes(base: u64) -> [u8; 6] {
        let mut data = [0u8; 6];
        data[..4].copy_from_slice(&u32::to_be_bytes((base >> 1) as u32));
        data[4] = ((base & 1) as u8) << 7 | 0x7E;
        data
    }

    #[test]
    fn test_read_resync() {
        let packet = build_packet(0x0130, 0, true, None, b"caption pes");
        let mut stream = vec![0x00, 0x12, 0x34];
        stream.extend_from_slice(&packet.0);

        let mut r = &stream[..];
        assert_eq!(Packet::read(&mut r).unwrap(), Some(packet.clone()));
        assert_eq!(Packet::read(&mut r).unwrap(), None);

        // 同期バイトが現れないストリーム
        let mut r = &[0x00u8; 600][..];
        assert_eq!(Packet::read(&mut r).unwrap(), None);

        // パケットの途中で終わるストリーム
        let mut r = &packet.0[..100];
        assert_eq!(Packet::read(&mut r).unwrap(), None);
    }

    #[test]
    fn test_accessors() {
        let packet = build_packet(0x0130, 9, true, None, b"caption pes");
        assert!(packet.is_valid());
        assert!(!packet.error_indicator());
        assert!(packet.unit_start_indicator());
        assert_eq!(packet.pid(), Pid::new(0x0130));
        assert_eq!(packet.continuity_counter(), 9);
        assert!(!packet.is_scrambled());
        assert!(packet.has_payload());
        assert!(packet.adaptation_field().is_none());
        assert!(packet.payload().unwrap().starts_with(b"caption pes"));
    }

    #[test]
    fn test_adaptation_field() {
        let mut af = vec![0b00010000];
        af.extend_from_slice(&pcr_bytes(1_234_567));

        let packet = build_packet(0x0111, 0, false, Some(&af), b"");
        let af = packet.adaptation_field().unwrap();
        assert!(!af.discontinuity_indicator());
        assert_eq!(af.pcr(), Some(Timestamp::new(1_234_567)));

        // ペイロードはアダプテーションフィールドの直後から
        assert_eq!(packet.payload().unwrap().len(), PACKET_SIZE - 5 - 7);

        // PCRフラグの無いフィールド
        let packet = build_packet(0x0111, 0, false, Some(&[0b10000000]), b"");
        let af = packet.adaptation_field().unwrap();
        assert!(af.discontinuity_indicator());
        assert_eq!(af.pcr(), None);
    }

    #[test]
    fn test_is_valid() {
        let mut packet = build_packet(0x0130, 0, false, None, b"");
        assert!(packet.is_valid());

        // 同期バイト破損
        packet.0[0] = 0x00;
        assert!(!packet.is_valid());
        packet.0[0] = SYNC_BYTE;

        // ビット誤り
        packet.0[1] |= 0b10000000;
        assert!(!packet.is_valid());
        packet.0[1] &= !0b10000000;

        // 予約されたPID
        let packet = build_packet(0x0002, 0, false, None, b"");
        assert!(!packet.is_valid());

        // アダプテーションフィールド制御の予約値
        let mut packet = build_packet(0x0130, 0, false, None, b"");
        packet.0[3] &= !0b00110000;
        assert!(!packet.is_valid());
    }

    #[test]
    fn test_iter() {
        let first = build_packet(0x0130, 0, true, None, b"one");
        let second = build_packet(0x0130, 1, false, None, b"two");
        let stream = [first.0, second.0].concat();

        let mut iter = Packet::iter(&*stream);
        assert_eq!(iter.next().unwrap().unwrap(), first);
        assert_eq!(iter.next().unwrap().unwrap(), second);
        assert_matches!(iter.next(), None);
    }
}
