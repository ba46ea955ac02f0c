//! 字幕プレーン上のレイアウト状態と動作位置。

use super::palette::{self, Rgba};

/// 文字サイズ。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextSize {
    /// 小型（SSZ）。
    Small,
    /// 中型（MSZ）。
    Middle,
    /// 標準（NSZ）。
    #[default]
    Normal,
}

impl TextSize {
    /// 横・縦方向の倍率。
    #[inline]
    pub fn factor(self) -> (f64, f64) {
        match self {
            TextSize::Small => (0.5, 0.5),
            TextSize::Middle => (0.5, 1.0),
            TextSize::Normal => (1.0, 1.0),
        }
    }
}

/// 表示書式・色・動作位置などのレイアウト状態。
///
/// 座標と大きさはすべてドット単位で、原点は表示領域の左上である。
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutState {
    /// 書式（SWF）。画面全体の大きさ。
    pub swf: (i32, i32),
    /// 表示領域の大きさ（SDF）。
    pub sdf: (i32, i32),
    /// 表示領域の位置（SDP）。
    pub sdp: (i32, i32),
    /// 文字の構成ドット数（SSM）。
    pub ssm: (i32, i32),
    /// 字間隔（SHS）。
    pub shs: i32,
    /// 行間隔（SVS）。
    pub svs: i32,
    /// 文字サイズ。
    pub text_size: TextSize,
    /// 動作位置。最初の移動まで未設定。
    pub pos: Option<(i32, i32)>,
    /// 選択中のパレット番号。
    pub palette: u8,
    /// 前景色。
    pub fg: Rgba,
    /// 背景色。
    pub bg: Rgba,
    /// 文字飾りの色。
    pub orn: Option<Rgba>,
    /// アンダーライン中かどうか。
    pub stl: bool,
    /// 囲み制御（4ビット）。
    pub hlc: u8,
    /// 書式や色が変化したかどうか。
    pub style_changed: bool,
    /// TIMEで累積した処理待ち時間（秒）。
    pub time_elapsed: f64,
    /// CSで確定した表示終了時刻（秒）。
    pub end_time: Option<f64>,
}

impl Default for LayoutState {
    fn default() -> LayoutState {
        LayoutState {
            swf: (960, 540),
            sdf: (960, 540),
            sdp: (0, 0),
            ssm: (36, 36),
            shs: 4,
            svs: 24,
            text_size: TextSize::Normal,
            pos: None,
            palette: 0,
            fg: palette::color(0, 7),
            bg: palette::color(0, 8),
            orn: None,
            stl: false,
            hlc: 0,
            style_changed: false,
            time_elapsed: 0.0,
            end_time: None,
        }
    }
}

impl LayoutState {
    /// 一文字分の外枠（区画）の大きさ。
    pub fn kukaku(&self) -> (i32, i32) {
        let (fx, fy) = self.text_size.factor();
        (
            ((self.shs + self.ssm.0) as f64 * fx) as i32,
            ((self.svs + self.ssm.1) as f64 * fy) as i32,
        )
    }

    /// 動作位置を返す。未設定であれば先頭の区画に設定してから返す。
    pub fn pos_or_home(&mut self) -> (i32, i32) {
        match self.pos {
            Some(pos) => pos,
            None => {
                self.move_absolute_pos(0, 0);
                // move_absolute_posで必ず設定される
                self.pos.unwrap_or_default()
            }
        }
    }

    /// 動作位置をドット座標で直接指定する。
    #[inline]
    pub fn move_absolute_dot(&mut self, x: i32, y: i32) {
        self.pos = Some((x, y));
    }

    /// 動作位置を区画単位で指定する。位置は指定した区画の左下となる。
    pub fn move_absolute_pos(&mut self, col: i32, row: i32) {
        let (width, height) = self.kukaku();
        self.pos = Some((
            self.sdp.0 + col * width,
            self.sdp.1 + (row + 1) * height,
        ));
    }

    /// 動作位置を区画単位で相対移動する。
    ///
    /// 横方向は表示領域の端で折り返して行を移り、縦方向は折り返さない。
    pub fn move_relative_pos(&mut self, mut dx: i32, dy: i32) {
        let (mut x, mut y) = self.pos_or_home();
        let (width, height) = self.kukaku();

        while dx < 0 {
            dx += 1;
            x -= width;
            if x < self.sdp.0 {
                x = self.sdp.0 + self.sdf.0 - width;
                y -= height;
            }
        }
        while dx > 0 {
            dx -= 1;
            x += width;
            if x >= self.sdp.0 + self.sdf.0 {
                x = self.sdp.0;
                y += height;
            }
        }
        y += dy * height;

        self.pos = Some((x, y));
    }

    /// 動作位置を次行の先頭へ移す。
    pub fn move_newline(&mut self) {
        let (_, y) = self.pos_or_home();
        let (_, height) = self.kukaku();
        self.pos = Some((self.sdp.0, y + height));
        self.style_changed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kukaku() {
        let mut layout = LayoutState::default();
        assert_eq!(layout.kukaku(), (40, 60));

        layout.text_size = TextSize::Middle;
        assert_eq!(layout.kukaku(), (20, 60));
        layout.text_size = TextSize::Small;
        assert_eq!(layout.kukaku(), (20, 30));

        layout.text_size = TextSize::Normal;
        layout.shs = 2;
        layout.svs = 16;
        layout.ssm = (30, 30);
        assert_eq!(layout.kukaku(), (32, 46));
    }

    #[test]
    fn test_move_absolute() {
        let mut layout = LayoutState::default();
        layout.move_absolute_pos(2, 1);
        assert_eq!(layout.pos, Some((80, 120)));

        layout.move_newline();
        assert_eq!(layout.pos, Some((0, 180)));

        layout.move_absolute_dot(12, 34);
        assert_eq!(layout.pos, Some((12, 34)));

        // 表示領域の位置が加算される
        let mut layout = LayoutState {
            sdp: (100, 200),
            ..LayoutState::default()
        };
        layout.move_absolute_pos(0, 0);
        assert_eq!(layout.pos, Some((100, 260)));
    }

    #[test]
    fn test_move_relative_roundtrip() {
        let mut layout = LayoutState::default();
        layout.move_absolute_pos(3, 2);
        let origin = layout.pos;

        // 折り返しが無ければ往復で元に戻る
        layout.move_relative_pos(5, 0);
        layout.move_relative_pos(-5, 0);
        assert_eq!(layout.pos, origin);
    }

    #[test]
    fn test_move_relative_wrap() {
        let mut layout = LayoutState::default();
        layout.move_absolute_pos(0, 0);

        // 一行分進めると次行の左端になる
        let columns = layout.sdf.0 / layout.kukaku().0;
        layout.move_relative_pos(columns, 0);
        assert_eq!(layout.pos, Some((0, 60 + 60)));

        // 左端から後退すると前行の右端になる
        layout.move_relative_pos(-1, 0);
        assert_eq!(layout.pos, Some((960 - 40, 60)));
    }

    #[test]
    fn test_move_relative_vertical() {
        let mut layout = LayoutState::default();
        layout.move_absolute_pos(1, 1);
        layout.move_relative_pos(0, 2);
        assert_eq!(layout.pos, Some((40, 120 + 120)));

        // 縦方向は折り返さず負にもなる
        layout.move_relative_pos(0, -5);
        assert_eq!(layout.pos, Some((40, 240 - 300)));
    }

    #[test]
    fn test_move_without_pos() {
        // 動作位置が未設定の移動は先頭の区画からの移動になる
        let mut layout = LayoutState::default();
        layout.move_relative_pos(1, 0);
        assert_eq!(layout.pos, Some((40, 60)));

        let mut layout = LayoutState::default();
        layout.move_newline();
        assert_eq!(layout.pos, Some((0, 120)));
    }

    #[test]
    fn test_default_colors() {
        let layout = LayoutState::default();
        assert_eq!(layout.fg, palette::color(0, 7));
        assert_eq!(layout.bg, palette::color(0, 8));
        assert_eq!(layout.bg.a, 0);
        assert_eq!(layout.orn, None);
        assert!(!layout.stl);
        assert_eq!(layout.hlc, 0);
    }
}
