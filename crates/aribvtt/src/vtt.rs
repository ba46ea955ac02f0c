//! WebVTT文書の組み立て。

use std::fmt;
use std::io;
use std::time::Duration;

/// ひとつの字幕キュー。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    /// 表示開始時刻。
    pub start: Duration,
    /// 表示終了時刻。未定の間は次のキューの開始で閉じられる。
    pub end: Option<Duration>,
    /// スタイル付きのキュー本文。
    pub payload: String,
}

/// 復号した字幕文を時系列に蓄え、WebVTT文書として書き出す。
#[derive(Debug, Default)]
pub struct VttWriter {
    cues: Vec<Cue>,
}

impl VttWriter {
    /// 空の`VttWriter`を生成する。
    pub fn new() -> VttWriter {
        VttWriter::default()
    }

    /// 蓄えられたキュー。
    #[inline]
    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    /// 新しい字幕文を追加する。
    ///
    /// 直前のキューが開いたままであれば`start`で閉じる。`text`が空の字幕は
    /// 消去専用の文としてキューを作らない。`end_time`があればキューは
    /// `start + end_time`で閉じられる。
    pub fn push(&mut self, start: Duration, end_time: Option<f64>, text: &str, payload: &str) {
        if let Some(last) = self.cues.last_mut() {
            if last.end.is_none() {
                last.end = Some(start);
            }
        }

        if text.is_empty() {
            return;
        }

        let end = end_time.map(|secs| start + Duration::from_secs_f64(secs));
        self.cues.push(Cue {
            start,
            end,
            payload: payload.to_owned(),
        });
    }

    /// ストリーム終端の時刻で開いたままのキューを閉じる。
    pub fn finish(&mut self, end: Duration) {
        if let Some(last) = self.cues.last_mut() {
            if last.end.is_none() {
                last.end = Some(end.max(last.start));
            }
        }
    }

    /// WebVTT文書として書き出す。
    pub fn write_to<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "WEBVTT")?;
        writeln!(w, "X-TIMESTAMP-MAP=MPEGTS:0,LOCAL:00:00:00.000")?;
        writeln!(w)?;

        for cue in &self.cues {
            let end = cue.end.unwrap_or(cue.start);
            writeln!(w, "{} --> {}", CueTime(cue.start), CueTime(end))?;
            writeln!(w, "{}", cue.payload)?;
            writeln!(w)?;
        }

        Ok(())
    }
}

/// `H:MM:SS.mmm`形式の時刻表記。
struct CueTime(Duration);

impl fmt::Display for CueTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let secs = self.0.as_secs();
        write!(
            f,
            "{}:{:02}:{:02}.{:03}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60,
            self.0.subsec_millis(),
        )
    }
}
