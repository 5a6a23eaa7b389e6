use anyhow::bail;
use clap::{ArgAction, Parser, ValueEnum};
use ffmpeg_relay::{
    mapper::StreamSelection,
    output::WriteMode,
    pacing::Pacing,
    parse::{DEFAULT_CHUNK_SIZE, ParseOptions},
    remux::RemuxConfig,
};

/// Container used when pacing a relay and no format is given.
const STREAMING_FORMAT: &str = "flv";

/// Remux a container or inspect a media source.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Source: file path, URL or capture device
    pub input: String,

    /// Destination: file path or URL
    pub output: Option<String>,

    /// Relay this source after the input, on the same timeline; repeatable
    /// (needs --schedule-fps)
    #[arg(long = "then", value_name = "INPUT")]
    pub then: Vec<String>,

    /// What to do; remux when an output is given, dump otherwise
    #[arg(short, long, value_enum)]
    pub action: Option<ActionArg>,

    /// Output container format, e.g. flv, mpegts
    #[arg(short, long)]
    pub format: Option<String>,

    /// Pace the relay to the wall clock (live sinks)
    #[arg(
        long,
        num_args = 0..=1,
        default_missing_value = "true",
        default_value_t = false,
        action = ArgAction::Set
    )]
    pub streaming: bool,

    /// Relay the first video stream only, restamped and paced at this many
    /// frames per second
    #[arg(long)]
    pub schedule_fps: Option<u32>,

    /// Stop after this many packets; negative means no limit
    #[arg(long, allow_negative_numbers = true)]
    pub vframes: Option<i64>,

    /// Force the demuxer, e.g. v4l2 or h264
    #[arg(long)]
    pub input_format: Option<String>,

    /// Decode the input as a raw elementary stream with this decoder (dump only)
    #[arg(short, long)]
    pub codec: Option<String>,

    /// Bytes read per step when decoding an elementary stream
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// List NAL units of H.264/HEVC packets (dump only)
    #[arg(long)]
    pub nal: bool,

    /// Write packets in arrival order instead of interleaving
    #[arg(long)]
    pub immediate: bool,

    /// More logging; repeat for trace
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionArg {
    Dump,
    Remux,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpConfig {
    pub input: String,
    pub input_format: Option<String>,
    pub max_packets: Option<u64>,
    pub nal: bool,
}

#[derive(Debug, Clone)]
pub struct ParseConfig {
    pub input: String,
    pub codec: String,
    pub options: ParseOptions,
}

#[derive(Debug, Clone)]
pub enum Action {
    Dump(DumpConfig),
    Parse(ParseConfig),
    Remux(RemuxConfig),
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub action: Action,
}

impl TryFrom<Args> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> anyhow::Result<Self> {
        let max_packets = args
            .vframes
            .and_then(|n| if n >= 0 { Some(n as u64) } else { None });
        let action = match args.action {
            Some(action) => action,
            None if args.output.is_some() => ActionArg::Remux,
            None => ActionArg::Dump,
        };

        let action = match action {
            ActionArg::Dump => {
                if args.streaming || args.schedule_fps.is_some() || !args.then.is_empty() {
                    bail!("pacing options and --then only apply to remux");
                }
                match args.codec {
                    Some(codec) => {
                        if args.chunk_size == 0 {
                            bail!("--chunk-size must be positive");
                        }
                        if args.nal {
                            bail!("--nal lists container packets and cannot be used with --codec");
                        }
                        Action::Parse(ParseConfig {
                            input: args.input,
                            codec,
                            options: ParseOptions {
                                chunk_size: args.chunk_size,
                                max_packets,
                            },
                        })
                    }
                    None => Action::Dump(DumpConfig {
                        input: args.input,
                        input_format: args.input_format,
                        max_packets,
                        nal: args.nal,
                    }),
                }
            }
            ActionArg::Remux => {
                let Some(output) = args.output else {
                    bail!("remux needs an output");
                };
                if args.codec.is_some() || args.nal {
                    bail!("--codec and --nal only apply to dump");
                }
                let pacing = match (args.streaming, args.schedule_fps) {
                    (true, Some(_)) => bail!("--streaming and --schedule-fps are exclusive"),
                    (_, Some(0)) => bail!("--schedule-fps must be positive"),
                    (_, Some(fps)) => Some(Pacing::frame_scheduled(fps)),
                    (true, None) => Some(Pacing::relay()),
                    (false, None) => None,
                };
                if !args.then.is_empty() && args.schedule_fps.is_none() {
                    bail!("--then joins sources only with --schedule-fps");
                }

                let mut builder = RemuxConfig::builder(args.input, output);
                for input in args.then {
                    builder = builder.then_input(input);
                }
                if let Some(format) = args.input_format {
                    builder = builder.input_format(format);
                }
                let format = match (args.format, pacing) {
                    (Some(format), _) => Some(format),
                    (None, Some(_)) => Some(STREAMING_FORMAT.to_string()),
                    (None, None) => None,
                };
                if let Some(format) = format {
                    builder = builder.output_format(format);
                }
                if let Some(pacing) = pacing {
                    builder = builder.pacing(pacing);
                    if args.schedule_fps.is_some() {
                        builder = builder.selection(StreamSelection::FirstVideo);
                    }
                }
                if args.immediate {
                    builder = builder.write_mode(WriteMode::Immediate);
                }
                if let Some(max) = max_packets {
                    builder = builder.max_packets(max);
                }
                Action::Remux(builder.build())
            }
        };
        Ok(Self { action })
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
