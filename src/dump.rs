use anyhow::Context;
use ffmpeg_next::codec;
use ffmpeg_relay::{
    annexb,
    input::{AvInput, ContainerReader},
    packet::RawPacket,
    parse::ParsePipeline,
    stream::StreamDescriptor,
};
use tokio_util::sync::CancellationToken;

use crate::config::{DumpConfig, ParseConfig};

/// Print the streams and packets of a container.
pub fn dump(config: &DumpConfig, cancel: &CancellationToken) -> anyhow::Result<()> {
    let mut reader = AvInput::open(&config.input, config.input_format.as_deref(), None)
        .with_context(|| format!("open {}", config.input))?;

    let streams: Vec<StreamDescriptor> = reader.streams().to_vec();
    for stream in &streams {
        println!("{}", describe(stream));
    }

    let mut count: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            log::info!("dump cancelled");
            break;
        }
        if config.max_packets.is_some_and(|max| count >= max) {
            break;
        }
        let packet = match reader.read_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => break,
            Err(e) if e.is_would_block() => continue,
            Err(e) => return Err(e.into()),
        };
        count += 1;
        println!(
            "packet {} stream={} pts={:?} dts={:?} duration={} size={}{}",
            count,
            packet.index(),
            packet.pts(),
            packet.dts(),
            packet.duration(),
            packet.size(),
            if packet.is_key() { " key" } else { "" }
        );
        if config.nal {
            if let Some(stream) = streams.iter().find(|s| s.index() == packet.index()) {
                print_nal_units(stream, &packet);
            }
        }
    }
    log::info!("{} packets", count);
    Ok(())
}

/// Decode a raw elementary stream and print every frame.
pub fn parse(config: &ParseConfig, cancel: &CancellationToken) -> anyhow::Result<()> {
    let mut pipeline =
        ParsePipeline::open(&config.input, config.codec.as_str(), config.options.clone())
            .with_context(|| format!("open {} as {}", config.input, config.codec))?;
    let summary = pipeline.run(cancel, |event| {
        println!("frame[{}:{}] {}", event.packet, event.index, event.frame);
    })?;
    println!(
        "{} bytes, {} packets, {} frames",
        summary.bytes, summary.packets, summary.frames
    );
    Ok(())
}

fn describe(stream: &StreamDescriptor) -> String {
    let mut line = format!(
        "stream {}: {:?} {:?} time_base={}",
        stream.index(),
        stream.kind(),
        stream.codec_id(),
        stream.time_base()
    );
    if stream.is_video() {
        line.push_str(&format!(" {}x{}", stream.width(), stream.height()));
    }
    line
}

fn print_nal_units(stream: &StreamDescriptor, packet: &RawPacket) {
    let hevc = match stream.codec_id() {
        codec::Id::H264 => false,
        codec::Id::HEVC => true,
        _ => return,
    };
    let data = if annexb::needs_annexb_conversion(stream.parameters()) {
        annexb::convert_avcc_to_annexb(packet.as_slice())
    } else {
        packet.data()
    };
    for nal in annexb::nal_units(&data) {
        let kind = if hevc { nal.hevc_type() } else { nal.h264_type() };
        println!("  nal offset={} size={} type={}", nal.offset, nal.size, kind);
    }
}
