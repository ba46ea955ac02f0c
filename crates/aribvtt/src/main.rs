use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use aribvtt::caption::CaptionDecoder;
use aribvtt::demux::{Demuxer, Filter, PacketType};
use aribvtt::desc::StreamType;
use aribvtt::pes::PesPacket;
use aribvtt::psi::PsiSection;
use aribvtt::table::{Pat, Pmt};
use aribvtt::time::Timestamp;
use aribvtt::vtt::VttWriter;
use aribvtt::{Packet, Pid};

#[derive(Debug)]
struct AppArgs {
    service: Option<u16>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
}

impl AppArgs {
    const HELP: &str = "\
TS内の字幕をWebVTTへ変換するコマンド

USAGE:
  aribvtt [OPTIONS]

FLAGS:
  -h, --help        このヘルプを表示する

OPTIONS:
  -i, --input PATH  読み込むTSファイル。未指定の場合は標準入力
  -o, --output PATH 書き出すWebVTTファイル。未指定の場合は標準出力
  --sid SID         対象のサービスID。
                    未指定の場合は最初のサービスが選択される
";

    fn parse() -> Result<AppArgs, Box<dyn std::error::Error>> {
        let mut args = pico_args::Arguments::from_env();

        if args.contains(["-h", "--help"]) {
            println!("{}", Self::HELP);
            std::process::exit(0);
        }

        let service = args.opt_value_from_str("--sid")?;
        let input = args.opt_value_from_str(["-i", "--input"])?;
        let output = args.opt_value_from_str(["-o", "--output"])?;

        Ok(AppArgs {
            service,
            input,
            output,
        })
    }
}

struct VttFilter {
    manual_service_id: Option<u16>,

    current_service_id: Option<u16>,
    pmt_pid: Pid,
    caption_pid: Pid,

    pcr_pid: Pid,
    first_pcr: Option<Timestamp>,
    last_pcr: Option<Timestamp>,

    writer: VttWriter,
}

impl VttFilter {
    fn new(service_id: Option<u16>) -> VttFilter {
        VttFilter {
            manual_service_id: service_id,

            current_service_id: None,
            pmt_pid: Pid::NULL,
            caption_pid: Pid::NULL,

            pcr_pid: Pid::NULL,
            first_pcr: None,
            last_pcr: None,

            writer: VttWriter::new(),
        }
    }

    /// 最初のPCRからの経過時間に換算する。
    fn elapsed(&self, ts: Timestamp) -> Option<std::time::Duration> {
        self.first_pcr.map(|first| ts.elapsed_since(first))
    }

    fn into_writer(mut self) -> VttWriter {
        if let (Some(first), Some(last)) = (self.first_pcr, self.last_pcr) {
            self.writer.finish(last.elapsed_since(first));
        }
        self.writer
    }
}

impl Filter for VttFilter {
    fn on_packet(&mut self, packet: &Packet) -> Option<PacketType> {
        if packet.pid() == self.pcr_pid {
            if let Some(pcr) = packet.adaptation_field().and_then(|af| af.pcr()) {
                if self.first_pcr.is_none() {
                    self.first_pcr = Some(pcr);
                }
                self.last_pcr = Some(pcr);
            }
        }

        match packet.pid() {
            Pid::PAT => Some(PacketType::Psi),
            pid if self.pmt_pid == pid => Some(PacketType::Psi),
            pid if self.caption_pid == pid => Some(PacketType::Pes),
            _ => None,
        }
    }

    fn on_psi_section(&mut self, packet: &Packet, psi: &PsiSection) {
        match packet.pid() {
            Pid::PAT => {
                let Some(pat) = Pat::read(psi) else {
                    return;
                };

                self.pmt_pid = Pid::NULL;
                self.current_service_id = None;
                let program = match self.manual_service_id {
                    // サービスIDが指定されていない場合は最初のサービスが対象
                    None => pat.pmts.first(),

                    // サービスIDが指定されている場合はそのサービスを使用
                    Some(service_id) => pat
                        .pmts
                        .iter()
                        .find(|program| program.program_number.get() == service_id),
                };
                let Some(program) = program else { return };

                self.pmt_pid = program.program_map_pid;
                self.current_service_id = Some(program.program_number.get());
            }

            pid if self.pmt_pid == pid => {
                let Some(service_id) = self.current_service_id else {
                    return;
                };
                let Some(pmt) = Pmt::read(psi) else {
                    return;
                };
                if pmt.program_number != service_id {
                    return;
                }

                self.pcr_pid = pmt.pcr_pid;
                self.caption_pid = Pid::NULL;

                for stream in &pmt.streams {
                    if stream.stream_type != StreamType::CAPTION {
                        continue;
                    }
                    // ストリーム識別記述子を持つ字幕ESだけが対象
                    if stream.descriptors.component_tag().is_none() {
                        continue;
                    }

                    self.caption_pid = stream.elementary_pid;
                    break;
                }
            }

            _ => {}
        }
    }

    fn on_pes_packet(&mut self, _packet: &Packet, pes: &PesPacket) {
        let Some(pts) = pes.pts() else {
            return;
        };
        let Some(start) = self.elapsed(pts) else {
            // 基準となるPCRが来るまでは時刻を決められない
            return;
        };

        let mut decoder = CaptionDecoder::new(pes.bytes);
        if let Err(e) = decoder.generate() {
            log::debug!("caption statement dropped: {e}");
            return;
        }

        self.writer
            .push(start, decoder.end_time(), decoder.text(), decoder.styled());
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = AppArgs::parse()?;

    let input: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(File::open(path)?),
        None => Box::new(io::stdin().lock()),
    };
    let input = BufReader::with_capacity(188 * 1024, input);

    let mut demuxer = Demuxer::new(VttFilter::new(args.service));
    for packet in Packet::iter(input) {
        demuxer.feed(&packet?);
    }

    let writer = demuxer.into_filter().into_writer();

    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut output = BufWriter::new(output);
    writer.write_to(&mut output)?;
    output.flush()?;

    Ok(())
}
