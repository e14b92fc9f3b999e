//! HEVCDecoderConfigurationRecord parsing via `scuffle_h265`.

use std::io::Cursor;

use bytes::Bytes;
use scuffle_h265::{HEVCDecoderConfigurationRecord, NALUnitType, SpsNALUnit};

use crate::codec::SpsInfo;
use crate::error::FlvError;
use crate::nalu::remove_epb;

/// Parsed HEVCDecoderConfigurationRecord (ISO 14496-15 §8.3.3.1).
#[derive(Debug, Clone)]
pub struct HevcDecoderConfigurationRecord {
    pub sps: Option<SpsInfo>,
    pub vps_arr: Vec<Bytes>,
    pub sps_arr: Vec<Bytes>,
    pub pps_arr: Vec<Bytes>,
    pub nal_unit_size: u8,
    /// The raw record, kept for packagers that re-emit `hvcC` verbatim.
    pub hvcc: Bytes,
}

/// Parse the configuration record from an HEVC sequence-header tag.
pub fn parse_decoder_configuration_record(
    data: &Bytes,
) -> Result<HevcDecoderConfigurationRecord, FlvError> {
    let record = HEVCDecoderConfigurationRecord::demux(&mut Cursor::new(data.clone()))
        .map_err(|e| FlvError::MalformedPayload(format!("bad hevc config record: {e:?}")))?;
    let nal_unit_size = record.length_size_minus_one + 1;

    let mut vps_arr = Vec::new();
    let mut sps_arr = Vec::new();
    let mut pps_arr = Vec::new();
    for array in &record.arrays {
        if array.nal_unit_type == NALUnitType::VpsNut {
            vps_arr.extend(array.nalus.iter().cloned());
        } else if array.nal_unit_type == NALUnitType::SpsNut {
            sps_arr.extend(array.nalus.iter().cloned());
        } else if array.nal_unit_type == NALUnitType::PpsNut {
            pps_arr.extend(array.nalus.iter().cloned());
        }
    }

    let sps = match sps_arr.first() {
        Some(nal) => Some(parse_sps(nal)?),
        None => None,
    };

    Ok(HevcDecoderConfigurationRecord {
        sps,
        vps_arr,
        sps_arr,
        pps_arr,
        nal_unit_size,
        hvcc: data.clone(),
    })
}

/// Decode the display fields of an H.265 SPS NAL unit (2-byte header
/// included).
pub fn parse_sps(nal: &[u8]) -> Result<SpsInfo, FlvError> {
    let parsed = SpsNALUnit::parse(Cursor::new(nal))
        .map_err(|e| FlvError::MalformedPayload(format!("bad hevc sps: {e:?}")))?;
    let width = parsed.rbsp.cropped_width() as u32;
    let height = parsed.rbsp.cropped_height() as u32;

    let profile = parsed.rbsp.profile_tier_level.general_profile.clone();
    let space = match profile.profile_space {
        1 => "A",
        2 => "B",
        3 => "C",
        _ => "",
    };
    let tier = if profile.tier_flag { "H" } else { "L" };
    // First byte of general_constraint_indicator_flags, for the codec string.
    let rbsp = remove_epb(nal);
    let constraint = rbsp.get(8).copied().unwrap_or(0);
    let codec = format!(
        "hev1.{space}{}.{:X}.{tier}{}.{constraint:02X}",
        profile.profile_idc,
        profile.profile_compatibility_flag.bits().reverse_bits(),
        profile.level_idc.unwrap_or_default(),
    );

    Ok(SpsInfo {
        codec,
        width,
        height,
        sar_ratio: (1, 1),
        fps_num: 0,
        fps_den: 1,
    })
}
