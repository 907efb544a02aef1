//! QR rendering of display payloads.
//!
//! Uses the `qrcode` crate for the matrix and the `image` crate to encode
//! PNG output; SVG comes straight from the `qrcode` renderer.

use image::{GrayImage, Luma};
use qrcode::render::{svg, unicode};
use qrcode::QrCode;

use crate::access::types::*;

/// Module size in pixels (each QR "module" becomes this many px wide).
const MODULE_PX: u32 = 8;
/// Quiet-zone border in modules.
const QUIET_ZONE: u32 = 4;

fn encode(text: &str) -> AccessResult<QrCode> {
    QrCode::new(text.as_bytes()).map_err(|e| {
        AccessError::new(AccessErrorKind::QrEncodeFailed, format!("QR encode error: {}", e))
    })
}

/// PNG bytes of a QR code for `text`.
pub fn payload_to_qr_png(text: &str, module_px: Option<u32>) -> AccessResult<Vec<u8>> {
    let code = encode(text)?;

    let px = module_px.unwrap_or(MODULE_PX).max(1);
    let matrix = code.to_colors();
    let width = code.width() as u32;
    let img_size = (width + QUIET_ZONE * 2) * px;

    let mut img = GrayImage::from_pixel(img_size, img_size, Luma([255u8]));

    for y in 0..width {
        for x in 0..width {
            if matrix[(y * width + x) as usize] != qrcode::Color::Dark {
                continue;
            }
            let px_x = (x + QUIET_ZONE) * px;
            let px_y = (y + QUIET_ZONE) * px;
            for dy in 0..px {
                for dx in 0..px {
                    img.put_pixel(px_x + dx, px_y + dy, Luma([0u8]));
                }
            }
        }
    }

    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        img.as_raw(),
        img_size,
        img_size,
        image::ExtendedColorType::L8,
    )
    .map_err(|e| AccessError::new(AccessErrorKind::QrEncodeFailed, format!("PNG encode error: {}", e)))?;

    Ok(buf)
}

/// SVG document of a QR code for `text`, at least `min_px` square.
pub fn payload_to_qr_svg(text: &str, min_px: u32) -> AccessResult<String> {
    let code = encode(text)?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(min_px, min_px)
        .build())
}

/// Half-block text rendering for terminals, dark modules on a light
/// background.
pub fn payload_to_qr_text(text: &str) -> AccessResult<String> {
    let code = encode(text)?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// `data:image/png;base64,...` URI for a generated code's payload.
pub fn code_to_qr_data_uri(code: &GeneratedCode) -> AccessResult<String> {
    use base64::Engine;
    let png = payload_to_qr_png(&code.code, None)?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(png);
    Ok(format!("data:image/png;base64,{}", b64))
}

/// QR matrix width in modules for `text`.
pub fn qr_matrix_width(text: &str) -> AccessResult<usize> {
    Ok(encode(text)?.width())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::core;

    const PAYLOAD: &str = "ISSY-R-11111111-176423";

    #[test]
    fn png_has_magic_bytes() {
        let png = payload_to_qr_png(PAYLOAD, None).unwrap();
        assert!(png.len() > 100);
        assert_eq!(&png[..4], b"\x89PNG");
    }

    #[test]
    fn larger_modules_give_larger_png() {
        let small = payload_to_qr_png(PAYLOAD, Some(2)).unwrap();
        let large = payload_to_qr_png(PAYLOAD, Some(16)).unwrap();
        assert!(large.len() > small.len());
    }

    #[test]
    fn zero_module_size_is_clamped() {
        assert!(payload_to_qr_png(PAYLOAD, Some(0)).is_ok());
    }

    #[test]
    fn svg_output() {
        let svg = payload_to_qr_svg(PAYLOAD, 200).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn text_output_uses_half_blocks() {
        let text = payload_to_qr_text(PAYLOAD).unwrap();
        let rows = text.lines().count();
        let width = qr_matrix_width(PAYLOAD).unwrap();
        // Two modules per row, plus the quiet zone.
        assert!(rows >= (width + 1) / 2);
        assert!(text.chars().any(|c| c == '\u{2580}' || c == '\u{2584}' || c == '\u{2588}'));
    }

    #[test]
    fn data_uri_for_generated_code() {
        let code = core::generate_at(
            "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=",
            "11111111-aaaa-bbbb-cccc-222222222222",
            Some(1_000_000),
            0,
        )
        .unwrap();
        let uri = code_to_qr_data_uri(&code).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn payload_fits_small_symbol() {
        // 22 bytes fit a version 2 symbol (25 modules).
        let width = qr_matrix_width(PAYLOAD).unwrap();
        assert!(width >= 21 && width <= 29);
    }

    #[test]
    fn oversized_text_fails() {
        let err = payload_to_qr_png(&"x".repeat(8_000), None).unwrap_err();
        assert_eq!(err.kind, AccessErrorKind::QrEncodeFailed);
    }
}
