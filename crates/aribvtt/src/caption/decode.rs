//! 字幕文データの復号を行う状態機械。

use std::fmt::Write as _;

use crate::time::Timestamp;

use super::charset::{self, GraphicSet};
use super::drcs::{DrcsGlyph, DrcsRegistry};
use super::layout::{LayoutState, TextSize};
use super::palette;
use super::{DecodeError, Unsupported};

/// PESの固定ヘッダ長。
const PES_HEADER_SIZE: usize = 6;

/// 符号集合から引いた図形。
#[derive(Debug)]
enum Glyph {
    /// Unicode文字列として描画する図形。
    Text(String),

    /// DRCS図形。
    Drcs(DrcsGlyph),

    /// マクロ。G0〜G3を一括で指示し直す。
    Macro(&'static [charset::MacroRef; 4]),
}

/// 字幕PESひとつ分を復号する状態機械。
///
/// 状態はPESごとに作り直され、[`generate`](CaptionDecoder::generate)が
/// 返ったあとに各出力を観測する。DRCSの登録は文をまたいで持ち越されない。
pub struct CaptionDecoder<'a> {
    pes: &'a [u8],

    /// G0〜G3に指示された符号集合。
    sets: [GraphicSet; 4],
    /// GLに呼び出された集合の番号。
    gl: usize,
    /// GRに呼び出された集合の番号。
    gr: usize,

    drcs: DrcsRegistry,
    layout: LayoutState,

    text: String,
    styled: String,
}

impl<'a> CaptionDecoder<'a> {
    /// PESヘッダから始まる字幕PESのバイト列から`CaptionDecoder`を生成する。
    pub fn new(pes: &'a [u8]) -> CaptionDecoder<'a> {
        CaptionDecoder {
            pes,
            sets: [
                GraphicSet::Kanji,
                GraphicSet::Alnum,
                GraphicSet::Hiragana,
                GraphicSet::Macro,
            ],
            gl: 0,
            gr: 2,
            drcs: DrcsRegistry::default(),
            layout: LayoutState::default(),
            text: String::new(),
            styled: String::new(),
        }
    }

    /// 復号された平文テキスト。
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// バイト範囲のスパンを残したスタイル付き出力。
    #[inline]
    pub fn styled(&self) -> &str {
        &self.styled
    }

    /// CSで確定した表示終了時刻（秒）。
    #[inline]
    pub fn end_time(&self) -> Option<f64> {
        self.layout.end_time
    }

    /// 復号後のレイアウト状態。
    #[inline]
    pub fn layout(&self) -> &LayoutState {
        &self.layout
    }

    /// PESヘッダのPTS（90kHz、33ビット）。
    pub fn pts(&self) -> Result<Timestamp, DecodeError> {
        let data = self.range(PES_HEADER_SIZE + 3, PES_HEADER_SIZE + 8)?;
        Ok(Timestamp::read_pts(data.try_into().unwrap()))
    }

    /// 字幕PES全体を復号する。
    ///
    /// 第一言語の字幕文データ以外のデータグループは何も出力せずに成功する。
    pub fn generate(&mut self) -> Result<(), DecodeError> {
        let header_len = self.at(PES_HEADER_SIZE + 2)? as usize;
        let packet_header_len =
            (self.at(PES_HEADER_SIZE + 3 + header_len + 2)? & 0x0F) as usize;

        let data_group = PES_HEADER_SIZE + 3 + header_len + 3 + packet_header_len;
        let data_group_id = (self.at(data_group)? & 0xFC) >> 2;
        let data_group_size =
            ((self.at(data_group + 3)? as usize) << 8) | self.at(data_group + 4)? as usize;

        // CRC16は検証しない
        let _crc16 = self.range(
            data_group + 5 + data_group_size,
            data_group + 7 + data_group_size,
        )?;

        // 第一言語の字幕文データだけを対象とする
        if data_group_id & 0x0F != 1 {
            return Ok(());
        }

        // 字幕文データの先頭はTMDとデータユニットループ長。
        // TMDは字幕では00固定とされているため読み飛ばす
        let mut unit = data_group + 9;
        while unit < data_group + 5 + data_group_size {
            let parameter = self.at(unit + 1)?;
            let size = ((self.at(unit + 2)? as usize) << 16)
                | ((self.at(unit + 3)? as usize) << 8)
                | self.at(unit + 4)? as usize;
            let (begin, end) = (unit + 5, unit + 5 + size);

            match parameter {
                // 本文
                0x20 => self.parse_text(begin, end)?,
                // 1バイトDRCS
                0x30 => {
                    let data = self.range(begin, end)?;
                    self.drcs.ingest(1, data)?;
                }
                // 2バイトDRCS
                0x31 => {
                    let data = self.range(begin, end)?;
                    self.drcs.ingest(2, data)?;
                }
                // ビットマップ
                0x35 => return Err(Unsupported::Bitmap.into()),
                _ => return Err(Unsupported::DataUnit.into()),
            }

            unit += 5 + size;
        }

        Ok(())
    }

    fn at(&self, index: usize) -> Result<u8, DecodeError> {
        self.pes.get(index).copied().ok_or(DecodeError::Truncated)
    }

    fn range(&self, begin: usize, end: usize) -> Result<&'a [u8], DecodeError> {
        self.pes.get(begin..end).ok_or(DecodeError::Truncated)
    }

    fn rest(&self, index: usize) -> &'a [u8] {
        self.pes.get(index..).unwrap_or(&[])
    }

    fn push_span(&mut self, byte: u8) {
        let _ = write!(self.styled, "<c.0x{byte:02x}></c>");
    }

    /// 本文データユニットを1バイトずつ読み進める。
    fn parse_text(&mut self, begin: usize, end: usize) -> Result<(), DecodeError> {
        let mut begin = begin;
        while begin < end {
            let start = begin;
            let byte = self.at(begin)?;

            // GL・GR領域の図形符号
            match byte {
                0x21..=0x7E => {
                    let set = self.sets[self.gl];
                    let bytes = self.range(begin, begin + set.size())?;
                    self.render_character(bytes, set)?;
                    begin += set.size();
                    continue;
                }
                0xA1..=0xFE => {
                    let set = self.sets[self.gr];
                    let bytes = self.range(begin, begin + set.size())?;
                    self.render_character(bytes, set)?;
                    begin += set.size();
                    continue;
                }
                _ => {}
            }

            match byte {
                // NUL・BEL・CAN・RS・US・DEL
                0x00 | 0x07 | 0x18 | 0x1E | 0x1F | 0x7F => {
                    log::trace!("ignored control: 0x{byte:02X}");
                    begin += 1;
                }
                // APB
                0x08 => {
                    self.layout.move_relative_pos(-1, 0);
                    self.layout.style_changed = true;
                    begin += 1;
                }
                // APF
                0x09 => {
                    self.layout.move_relative_pos(1, 0);
                    self.layout.style_changed = true;
                    begin += 1;
                }
                // APD
                0x0A => {
                    self.layout.move_relative_pos(0, 1);
                    self.layout.style_changed = true;
                    begin += 1;
                }
                // APU
                0x0B => {
                    self.layout.move_relative_pos(0, -1);
                    self.layout.style_changed = true;
                    begin += 1;
                }
                // CS：処理待ちを挟んだ消去は表示終了時刻として扱う
                0x0C => {
                    if self.layout.time_elapsed != 0.0 {
                        self.layout.end_time = Some(self.layout.time_elapsed);
                    }
                    begin += 1;
                }
                // APR
                0x0D => {
                    self.layout.move_newline();
                    begin += 1;
                }
                // LS1
                0x0E => {
                    self.gl = 1;
                    begin += 1;
                }
                // LS0
                0x0F => {
                    self.gl = 0;
                    begin += 1;
                }
                // PAPF
                0x16 => {
                    let p1 = (self.at(begin + 1)? & 0x3F) as i32;
                    self.layout.move_relative_pos(p1, 0);
                    self.layout.style_changed = true;
                    begin += 2;
                }
                // SS2：次の符号をG2で描画する
                0x19 => {
                    let set = self.sets[2];
                    let bytes = self.range(begin + 1, begin + 1 + set.size())?;
                    self.render_character(bytes, set)?;
                    begin += 1 + set.size();
                }
                // ESC
                0x1B => begin = self.parse_esc(begin)?,
                // APS
                0x1C => {
                    let row = (self.at(begin + 1)? & 0x3F) as i32;
                    let col = (self.at(begin + 2)? & 0x3F) as i32;
                    self.layout.move_absolute_pos(col, row);
                    self.layout.style_changed = true;
                    begin += 3;
                }
                // SS3：次の符号をG3で描画する
                0x1D => {
                    let set = self.sets[3];
                    let bytes = self.range(begin + 1, begin + 1 + set.size())?;
                    self.render_character(bytes, set)?;
                    begin += 1 + set.size();
                }
                // SP：全角スペース
                0x20 => {
                    self.render_character(&[0xA1, 0xA1], GraphicSet::Kanji)?;
                    begin += 1;
                }
                // BKF〜WHF
                0x80..=0x87 => {
                    self.layout.fg = palette::color(self.layout.palette, byte & 0x0F);
                    self.layout.style_changed = true;
                    begin += 1;
                }
                // SSZ
                0x88 => {
                    self.layout.text_size = TextSize::Small;
                    self.layout.style_changed = true;
                    begin += 1;
                }
                // MSZ
                0x89 => {
                    self.layout.text_size = TextSize::Middle;
                    self.layout.style_changed = true;
                    begin += 1;
                }
                // NSZ
                0x8A => {
                    self.layout.text_size = TextSize::Normal;
                    self.layout.style_changed = true;
                    begin += 1;
                }
                // SZX
                0x8B => return Err(Unsupported::Szx.into()),
                // COL
                0x90 => {
                    let p1 = self.at(begin + 1)?;
                    if p1 == 0x20 {
                        self.layout.palette = self.at(begin + 2)? & 0x0F;
                        begin += 3;
                    } else {
                        let color = p1 & 0x0F;
                        match p1 & 0x70 {
                            0x40 => {
                                self.layout.fg = palette::color(self.layout.palette, color);
                                self.layout.style_changed = true;
                            }
                            0x50 => {
                                self.layout.bg = palette::color(self.layout.palette, color);
                                self.layout.style_changed = true;
                            }
                            _ => log::trace!("ignored COL: 0x{p1:02X}"),
                        }
                        begin += 2;
                    }
                }
                // FLC：点滅は無視
                0x91 => {
                    log::trace!("ignored FLC");
                    begin += 2;
                }
                // CDC
                0x92 => return Err(Unsupported::Cdc.into()),
                // POL
                0x93 => return Err(Unsupported::Pol.into()),
                // WMM
                0x94 => return Err(Unsupported::Wmm.into()),
                // MACRO
                0x95 => return Err(Unsupported::Macro.into()),
                // HLC
                0x97 => {
                    let hlc = self.at(begin + 1)? & 0x0F;
                    if (self.layout.hlc == 0) != (hlc == 0) {
                        self.layout.style_changed = true;
                    }
                    self.layout.hlc = hlc;
                    begin += 2;
                }
                // RPC
                0x98 => return Err(Unsupported::Rpc.into()),
                // SPL
                0x99 => {
                    self.layout.stl = false;
                    self.layout.style_changed = true;
                    begin += 1;
                }
                // STL
                0x9A => {
                    self.layout.stl = true;
                    self.layout.style_changed = true;
                    begin += 1;
                }
                // CSI
                0x9B => begin = self.parse_csi(begin)?,
                // TIME
                0x9D => match self.at(begin + 1)? {
                    // 処理待ち。0.1秒単位
                    0x20 => {
                        self.layout.time_elapsed += (self.at(begin + 2)? & 0x3F) as f64 / 10.0;
                        begin += 3;
                    }
                    // 時刻制御モードは運用しない
                    _ => return Err(Unsupported::Byte(byte).into()),
                },
                _ => return Err(Unsupported::Byte(byte).into()),
            }

            // 消費した制御符号のバイト範囲をスパンとして残す
            for &b in self.range(start, begin)? {
                self.push_span(b);
            }
        }

        Ok(())
    }

    /// エスケープ列を読み取る。戻り値は次に読むべき位置。
    fn parse_esc(&mut self, begin: usize) -> Result<usize, DecodeError> {
        match *self.rest(begin + 1) {
            // LS2
            [0x6E, ..] => {
                self.gl = 2;
                Ok(begin + 2)
            }
            // LS3
            [0x6F, ..] => {
                self.gl = 3;
                Ok(begin + 2)
            }
            // LS1R
            [0x7E, ..] => {
                self.gr = 1;
                Ok(begin + 2)
            }
            // LS2R
            [0x7D, ..] => {
                self.gr = 2;
                Ok(begin + 2)
            }
            // LS3R
            [0x7C, ..] => {
                self.gr = 3;
                Ok(begin + 2)
            }

            // 1バイトDRCSの指示
            [g @ 0x28..=0x2B, 0x20, term, ..] => {
                self.sets[(g - 0x28) as usize] = GraphicSet::from_drcs_term(term)?;
                Ok(begin + 4)
            }
            [0x28..=0x2B, 0x20] => Err(DecodeError::Truncated),
            // 1バイトGセットの指示
            [g @ 0x28..=0x2B, term, ..] => {
                self.sets[(g - 0x28) as usize] = GraphicSet::from_term(term)?;
                Ok(begin + 3)
            }
            [0x28..=0x2B] => Err(DecodeError::Truncated),

            // 2バイトDRCSの指示
            [0x24, g @ 0x28..=0x2B, 0x20, term, ..] => {
                self.sets[(g - 0x28) as usize] = GraphicSet::from_drcs_term(term)?;
                Ok(begin + 5)
            }
            [0x24, 0x28..=0x2B, 0x20] => Err(DecodeError::Truncated),
            // 2バイトGセットの指示（中間符号つき）
            [0x24, g @ 0x28..=0x2B, term, ..] => {
                self.sets[(g - 0x28) as usize] = GraphicSet::from_term(term)?;
                Ok(begin + 4)
            }
            [0x24, 0x28..=0x2B] => Err(DecodeError::Truncated),
            // 2バイトGセットの指示（G0）
            [0x24, term, ..] => {
                self.sets[0] = GraphicSet::from_term(term)?;
                Ok(begin + 3)
            }
            [0x24] | [] => Err(DecodeError::Truncated),

            [_, ..] => Err(Unsupported::EscForm.into()),
        }
    }

    /// CSI列を読み取る。戻り値は終端符号の次の位置。
    fn parse_csi(&mut self, begin: usize) -> Result<usize, DecodeError> {
        let mut last = begin + 1;
        loop {
            let op = self.at(last)?;
            match op {
                // SWF
                0x53 => {
                    let mut index = begin + 1;
                    let (p1, term) = self.scan_number(&mut index, &[0x3B, 0x20])?;
                    if term != 0x20 {
                        // 複数パラメータの書式設定は運用しない
                        return Err(Unsupported::SwfValue.into());
                    }
                    self.layout.swf = match p1 {
                        5 => (1920, 1080),
                        7 => (960, 540),
                        9 => (720, 480),
                        _ => return Err(Unsupported::SwfValue.into()),
                    };
                    self.layout.style_changed = true;
                    break;
                }
                // SDF
                0x56 => {
                    self.layout.sdf = self.scan_pair(begin + 1)?;
                    self.layout.style_changed = true;
                    break;
                }
                // SSM
                0x57 => {
                    self.layout.ssm = self.scan_pair(begin + 1)?;
                    self.layout.style_changed = true;
                    break;
                }
                // SHS
                0x58 => {
                    let mut index = begin + 1;
                    let (shs, _) = self.scan_number(&mut index, &[0x20])?;
                    self.layout.shs = shs;
                    self.layout.style_changed = true;
                    break;
                }
                // SVS
                0x59 => {
                    let mut index = begin + 1;
                    let (svs, _) = self.scan_number(&mut index, &[0x20])?;
                    self.layout.svs = svs;
                    self.layout.style_changed = true;
                    break;
                }
                // SDP
                0x5F => {
                    self.layout.sdp = self.scan_pair(begin + 1)?;
                    self.layout.style_changed = true;
                    break;
                }
                // ACPS
                0x61 => {
                    let (x, y) = self.scan_pair(begin + 1)?;
                    self.layout.move_absolute_dot(x, y);
                    self.layout.style_changed = true;
                    break;
                }
                // ORN
                0x44 => {
                    match self.at(begin + 1)? {
                        // 文字飾りなし
                        0x30 => self.layout.orn = None,
                        // 縁取り。パレット番号と色番号が2桁ずつ続く
                        0x31 => {
                            let p2 =
                                (self.at(begin + 3)? & 0x0F) * 10 + (self.at(begin + 4)? & 0x0F);
                            let p3 =
                                (self.at(begin + 5)? & 0x0F) * 10 + (self.at(begin + 6)? & 0x0F);
                            self.layout.orn = Some(palette::color(p2, p3));
                            self.layout.style_changed = true;
                        }
                        _ => return Err(Unsupported::CsiOpcode(op).into()),
                    }
                    break;
                }
                // RCS：ラスタ色は無視
                0x6E => {
                    log::trace!("ignored RCS");
                    break;
                }
                // GSM・CCC・PLD・PLU・GAA・SRC・TCC・MDF・CFS・XCS・SCR・PRA・ACS・UED・SCS
                0x42 | 0x54 | 0x5B | 0x5C | 0x5D | 0x5E | 0x62 | 0x64 | 0x65 | 0x66 | 0x67
                | 0x68 | 0x69 | 0x6A | 0x6F => return Err(Unsupported::CsiOpcode(op).into()),
                _ => last += 1,
            }
        }

        Ok(last + 1)
    }

    /// `stops`のいずれかに達するまで数字パラメータを読み取る。
    fn scan_number(&self, index: &mut usize, stops: &[u8]) -> Result<(i32, u8), DecodeError> {
        let mut value: i32 = 0;
        loop {
            let byte = self.at(*index)?;
            *index += 1;
            if stops.contains(&byte) {
                return Ok((value, byte));
            }
            value = value.saturating_mul(10).saturating_add((byte & 0x0F) as i32);
        }
    }

    /// セミコロンで区切られたパラメータ2つを読み取る。
    fn scan_pair(&self, begin: usize) -> Result<(i32, i32), DecodeError> {
        let mut index = begin;
        let (p1, _) = self.scan_number(&mut index, &[0x3B])?;
        let (p2, _) = self.scan_number(&mut index, &[0x20])?;
        Ok((p1, p2))
    }

    /// 図形符号ひとつ分を描画する。
    ///
    /// `bytes`の各バイトは最上位ビットを落としてから表を引く。
    fn render_character(&mut self, bytes: &[u8], set: GraphicSet) -> Result<(), DecodeError> {
        self.layout.pos_or_home();

        let key = bytes
            .iter()
            .fold(0u16, |key, &b| (key << 8) | (b & 0x7F) as u16);

        match self.lookup(set, key) {
            Some(Glyph::Text(text)) => {
                self.styled.push_str(&text);
                self.text.push_str(&text);
            }
            Some(Glyph::Drcs(glyph)) => {
                // 平文には現れず、スタイル出力にのみフォントの寸法とビットマップを残す
                let _ = write!(
                    self.styled,
                    "<c.DRCS-{}-{}-{}-",
                    glyph.width, glyph.height, glyph.depth,
                );
                for &b in &glyph.data {
                    let _ = write!(self.styled, "{b:02x}");
                }
                self.styled.push_str("></c>");
            }
            Some(Glyph::Macro(entry)) => {
                for &b in bytes {
                    self.push_span(b);
                }
                let mut sets = self.sets;
                for (slot, mref) in sets.iter_mut().zip(entry) {
                    *slot = mref.resolve()?;
                }
                self.sets = sets;
                self.gl = 0;
                self.gr = 2;
                // マクロは動作位置を進めない
                return Ok(());
            }
            None => {
                log::debug!("unassigned code point: 0x{key:04X}");
                return Ok(());
            }
        }

        self.layout.move_relative_pos(1, 0);
        Ok(())
    }

    fn lookup(&self, set: GraphicSet, key: u16) -> Option<Glyph> {
        match set {
            GraphicSet::Kanji | GraphicSet::Hiragana | GraphicSet::Katakana => {
                Some(Glyph::Text(charset::decode_jis(key)))
            }
            GraphicSet::Alnum => Some(Glyph::Text(charset::decode_alnum(key))),
            GraphicSet::Macro => charset::macro_entry(key).map(Glyph::Macro),
            GraphicSet::Drcs(slot) => self.drcs.get(slot, key).cloned().map(Glyph::Drcs),
        }
    }
}
