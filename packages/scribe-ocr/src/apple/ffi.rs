use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use crate::engine::{EngineError, RecognitionLevel, RecognitionOptions};
use crate::region::{BoundingBox, Candidate, TextObservation};

extern "C" {
    fn vision_ocr_recognize_rgba(
        pixels: *const u8,
        width: u32,
        height: u32,
        bytes_per_row: u64,
        accurate: i32,
        language_correction: i32,
        max_candidates: u32,
        languages: *const c_char,
        out_data: *mut *mut u8,
        out_len: *mut u64,
        out_error: *mut *mut c_char,
    ) -> i32;

    fn vision_ocr_free_data(ptr: *mut u8, len: u64);
    fn vision_ocr_free_error(ptr: *mut c_char);
}

/// Status the shim returns for cancelled, out-of-memory and I/O failures.
const STATUS_UNAVAILABLE: i32 = 2;

/// Transient shim failures are retryable; everything else is final.
fn status_error(status: i32, msg: String) -> EngineError {
    if status == STATUS_UNAVAILABLE {
        EngineError::Unavailable(msg)
    } else {
        EngineError::InternalFailure(msg)
    }
}

unsafe fn parse_output(
    data: *mut u8,
    len: u64,
    error: *mut c_char,
    status: i32,
) -> Result<Vec<TextObservation>, EngineError> {
    if status != 0 || !error.is_null() {
        let msg = if !error.is_null() {
            let s = CStr::from_ptr(error).to_string_lossy().into_owned();
            vision_ocr_free_error(error);
            s
        } else {
            "unknown error".into()
        };
        if !data.is_null() {
            vision_ocr_free_data(data, len);
        }
        return Err(status_error(status, msg));
    }

    if data.is_null() || len == 0 {
        return Ok(Vec::new());
    }

    let slice = std::slice::from_raw_parts(data, len as usize);
    let observations = deserialize_observations(slice);
    vision_ocr_free_data(data, len);
    observations
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], EngineError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| EngineError::InternalFailure(format!("truncated {what}")))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self, what: &str) -> Result<u8, EngineError> {
        Ok(self.take(1, what)?[0])
    }

    fn u32(&mut self, what: &str) -> Result<u32, EngineError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4, what)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn f32(&mut self, what: &str) -> Result<f32, EngineError> {
        Ok(f32::from_bits(self.u32(what)?))
    }
}

/// Layout, little endian:
/// `count:u32` then per observation `has_bbox:u8 [x y w h: f32]
/// n:u32` and `n` times `len:u32 utf8[len] confidence:f32`.
fn deserialize_observations(data: &[u8]) -> Result<Vec<TextObservation>, EngineError> {
    let mut reader = Reader { data, pos: 0 };

    let count = reader.u32("observation count")? as usize;
    let mut observations = Vec::with_capacity(count.min(1024));

    for _ in 0..count {
        let bounding_box = if reader.u8("bbox flag")? != 0 {
            Some(BoundingBox {
                x: reader.f32("bbox")?,
                y: reader.f32("bbox")?,
                width: reader.f32("bbox")?,
                height: reader.f32("bbox")?,
            })
        } else {
            None
        };

        let n = reader.u32("candidate count")? as usize;
        let mut candidates = Vec::with_capacity(n.min(16));
        for _ in 0..n {
            let text_len = reader.u32("text length")? as usize;
            let text = String::from_utf8_lossy(reader.take(text_len, "text")?).into_owned();
            let confidence = reader.f32("confidence")?.clamp(0.0, 1.0);
            candidates.push(Candidate::new(text, confidence));
        }

        // Vision occasionally yields regions with no transcription.
        if candidates.is_empty() {
            continue;
        }
        let observation = TextObservation::new(bounding_box, candidates)
            .map_err(|e| EngineError::InternalFailure(e.to_string()))?;
        observations.push(observation);
    }

    Ok(observations)
}

pub fn recognize_rgba(
    pixels: &[u8],
    width: u32,
    height: u32,
    options: &RecognitionOptions,
) -> Result<Vec<TextObservation>, EngineError> {
    let languages = CString::new(options.languages.join(","))
        .map_err(|_| EngineError::InternalFailure("null byte in language tag".into()))?;

    let mut data: *mut u8 = std::ptr::null_mut();
    let mut len: u64 = 0;
    let mut error: *mut c_char = std::ptr::null_mut();

    unsafe {
        let status = vision_ocr_recognize_rgba(
            pixels.as_ptr(),
            width,
            height,
            width as u64 * 4,
            (options.level == RecognitionLevel::Accurate) as i32,
            options.language_correction as i32,
            options.candidate_limit() as u32,
            languages.as_ptr(),
            &mut data,
            &mut len,
            &mut error,
        );
        parse_output(data, len, error, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(out: &mut Vec<u8>, text: &str, confidence: f32) {
        out.extend((text.len() as u32).to_le_bytes());
        out.extend(text.as_bytes());
        out.extend(confidence.to_le_bytes());
    }

    #[test]
    fn parses_observations_with_candidates() {
        let mut buf = Vec::new();
        buf.extend(2u32.to_le_bytes());
        buf.push(1);
        for v in [0.1f32, 0.2, 0.3, 0.05] {
            buf.extend(v.to_le_bytes());
        }
        buf.extend(2u32.to_le_bytes());
        candidate(&mut buf, "HELLO", 0.9);
        candidate(&mut buf, "HELL0", 0.4);
        buf.push(0);
        buf.extend(0u32.to_le_bytes());

        let observations = deserialize_observations(&buf).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].candidates().len(), 2);
        assert_eq!(observations[0].top_candidate().text, "HELLO");
    }

    #[test]
    fn truncated_buffer_is_an_internal_failure() {
        let mut buf = Vec::new();
        buf.extend(1u32.to_le_bytes());
        buf.push(0);
        buf.extend(1u32.to_le_bytes());
        buf.extend(40u32.to_le_bytes());
        buf.extend(b"short");
        assert!(matches!(
            deserialize_observations(&buf),
            Err(EngineError::InternalFailure(_))
        ));
    }

    #[test]
    fn only_unavailable_status_is_retryable() {
        assert!(status_error(STATUS_UNAVAILABLE, "out of memory".into()).is_retryable());

        let invalid_image = status_error(1, "invalid image".into());
        assert!(matches!(invalid_image, EngineError::InternalFailure(_)));
        assert!(!invalid_image.is_retryable());
    }
}
