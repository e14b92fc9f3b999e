//! AVCDecoderConfigurationRecord parsing; SPS fields are decoded with
//! `h264_reader` rather than by hand.

use bytes::Bytes;
use h264_reader::nal::sps::SeqParameterSet;
use h264_reader::rbsp::{BitReader, decode_nal};

use crate::codec::SpsInfo;
use crate::error::FlvError;

/// Parsed AVCDecoderConfigurationRecord (ISO 14496-15 §5.2.4.1).
#[derive(Debug, Clone)]
pub struct AvcDecoderConfigurationRecord {
    pub sps: Option<SpsInfo>,
    pub sps_arr: Vec<Bytes>,
    pub pps_arr: Vec<Bytes>,
    /// NAL length-prefix width in bytes: `lengthSizeMinusOne + 1`.
    pub nal_unit_size: u8,
}

/// Parse the configuration record from an AVC sequence-header tag.
pub fn parse_decoder_configuration_record(
    data: &Bytes,
) -> Result<AvcDecoderConfigurationRecord, FlvError> {
    if data.len() < 7 {
        return Err(FlvError::MalformedPayload("avc config record too short".into()));
    }
    let nal_unit_size = (data[4] & 0x03) + 1;

    let mut cursor = 5usize;
    let num_sps = (data[cursor] & 0x1F) as usize;
    cursor += 1;
    let sps_arr = read_parameter_sets(data, &mut cursor, num_sps)?;

    if cursor >= data.len() {
        return Err(FlvError::MalformedPayload("avc config record truncated".into()));
    }
    let num_pps = data[cursor] as usize;
    cursor += 1;
    let pps_arr = read_parameter_sets(data, &mut cursor, num_pps)?;

    let sps = match sps_arr.first() {
        Some(nal) => Some(parse_sps(nal)?),
        None => None,
    };

    Ok(AvcDecoderConfigurationRecord {
        sps,
        sps_arr,
        pps_arr,
        nal_unit_size,
    })
}

fn read_parameter_sets(
    data: &Bytes,
    cursor: &mut usize,
    count: usize,
) -> Result<Vec<Bytes>, FlvError> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if *cursor + 2 > data.len() {
            return Err(FlvError::MalformedPayload("avc config record truncated".into()));
        }
        let len = ((data[*cursor] as usize) << 8) | data[*cursor + 1] as usize;
        *cursor += 2;
        if *cursor + len > data.len() {
            return Err(FlvError::MalformedPayload("avc config record truncated".into()));
        }
        sets.push(data.slice(*cursor..*cursor + len));
        *cursor += len;
    }
    Ok(sets)
}

/// Decode the display fields of an H.264 SPS NAL unit (header included).
pub fn parse_sps(nal: &[u8]) -> Result<SpsInfo, FlvError> {
    let rbsp = decode_nal(nal)
        .map_err(|e| FlvError::MalformedPayload(format!("bad sps rbsp: {e:?}")))?;
    if rbsp.len() < 5 {
        return Err(FlvError::MalformedPayload("sps too short".into()));
    }
    let codec = format!("avc1.{:02x}{:02x}{:02x}", rbsp[0], rbsp[1], rbsp[2]);

    let sps = SeqParameterSet::from_bits(BitReader::new(&*rbsp))
        .map_err(|e| FlvError::MalformedPayload(format!("bad sps: {e:?}")))?;
    let (width, height) = sps
        .pixel_dimensions()
        .map_err(|e| FlvError::MalformedPayload(format!("bad sps dimensions: {e:?}")))?;

    let mut sar_ratio = (1u32, 1u32);
    let mut fps_num = 0u32;
    let mut fps_den = 1u32;
    if let Some(ref vui) = sps.vui_parameters {
        if let Some((sar_w, sar_h)) = vui.aspect_ratio_info.as_ref().and_then(|a| a.clone().get())
        {
            sar_ratio = (sar_w as u32, sar_h as u32);
        }
        if let Some(ref timing) = vui.timing_info
            && timing.num_units_in_tick != 0
        {
            // Field-based timing: one frame spans two ticks.
            fps_num = timing.time_scale;
            fps_den = timing.num_units_in_tick * 2;
        }
    }

    Ok(SpsInfo {
        codec,
        width,
        height,
        sar_ratio,
        fps_num,
        fps_den,
    })
}
