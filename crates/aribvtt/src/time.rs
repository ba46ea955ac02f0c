//! PCR・PTSによる時刻計算。

use std::fmt;
use std::time::Duration;

/// 33ビットの周期。
const MODULUS: u64 = 1 << 33;

/// 1秒あたりのティック数。
const TICKS_PER_SEC: u64 = 90_000;

/// 90kHzで刻む33ビットの時刻。
///
/// PTSとPCRはどちらもこのクロックに落として扱う。33ビットで一周するため、
/// 2点間の経過時間は[`elapsed_since`](Timestamp::elapsed_since)で
/// 折り返しを考慮して求める。
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// ゼロを表す時刻。
    pub const ZERO: Timestamp = Timestamp(0);

    /// 90kHz単位の`ticks`から`Timestamp`を生成する。
    ///
    /// # パニック
    ///
    /// `ticks`が33ビットに収まらない場合、このメソッドはパニックする。
    #[inline]
    pub const fn new(ticks: u64) -> Timestamp {
        assert!(ticks < MODULUS);
        Timestamp(ticks)
    }

    /// PESヘッダのPTSフィールド5バイトから`Timestamp`を読み取る。
    ///
    /// 33ビットの値が3・15・15ビットに分かれ、それぞれマーカービットを
    /// 後ろに挟んで並んでいる。
    pub fn read_pts(data: &[u8; 5]) -> Timestamp {
        let mut ticks: u64 = 0;
        ticks = (ticks << 3) | ((data[0] >> 1) & 0x07) as u64;
        ticks = (ticks << 8) | data[1] as u64;
        ticks = (ticks << 7) | (data[2] >> 1) as u64;
        ticks = (ticks << 8) | data[3] as u64;
        ticks = (ticks << 7) | (data[4] >> 1) as u64;
        Timestamp(ticks)
    }

    /// アダプテーションフィールドのPCR6バイトから`Timestamp`を読み取る。
    ///
    /// 先頭33ビットが90kHzの基準値。続く27MHzの拡張部は字幕の時刻合わせには
    /// 細かすぎるため捨てる。
    pub fn read_pcr(data: &[u8; 6]) -> Timestamp {
        let mut base: u64 = 0;
        for &b in &data[..4] {
            base = (base << 8) | b as u64;
        }
        Timestamp((base << 1) | (data[4] >> 7) as u64)
    }

    /// 90kHz単位の値を返す。この値は33ビットに収まる。
    #[inline]
    pub const fn ticks(&self) -> u64 {
        self.0
    }

    /// `base`からの経過時間を返す。
    ///
    /// `base`より小さい値でも33ビットの折り返しとみなして正の経過時間になる。
    pub fn elapsed_since(self, base: Timestamp) -> Duration {
        let ticks = (MODULUS + self.0 - base.0) % MODULUS;
        Duration::from_nanos(ticks * 1_000_000_000 / TICKS_PER_SEC)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}
