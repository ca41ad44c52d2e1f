//! Export/download trigger for a single page element

use crate::download::{DownloadRequest, DownloadSink};
use crate::surface::{PageElement, ViewerSurface};
use crate::{Error, Result};
use log::debug;
use std::collections::HashSet;
use std::str::FromStr;

/// Substring of page element ids that precedes the page number
pub const PAGE_ID_MARKER: &str = "wideScreen";
/// What the marker becomes in file names
pub const PAGE_MARKER_REPLACEMENT: &str = " Page ";
/// Content type that makes the browser save rather than display the payload
pub const OCTET_STREAM: &str = "image/octet-stream";
/// JPEG quality used unless configured otherwise
pub const DEFAULT_JPEG_QUALITY: f32 = 0.95;

/// Raster encoding requested from the page element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageFormat {
    Jpeg { quality: f32 },
    Png,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg { .. } => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg { .. } => "jpg",
            ImageFormat::Png => "png",
        }
    }

    /// Encoder quality, only meaningful for lossy formats
    pub fn quality(&self) -> Option<f32> {
        match self {
            ImageFormat::Jpeg { quality } => Some(*quality),
            ImageFormat::Png => None,
        }
    }
}

impl Default for ImageFormat {
    fn default() -> Self {
        ImageFormat::Jpeg { quality: DEFAULT_JPEG_QUALITY }
    }
}

impl FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormat::default()),
            "png" => Ok(ImageFormat::Png),
            other => Err(Error::ConfigError(format!("unknown image format '{}'", other))),
        }
    }
}

/// Ids exported in this session.
///
/// Grows monotonically; membership is the only thing preventing a page from
/// being exported twice.
#[derive(Debug, Clone, Default)]
pub struct DownloadedPages {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl DownloadedPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Record an id; returns false if it was already present
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.seen.insert(id.to_string()) {
            return false;
        }
        self.order.push(id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in export order
    pub fn ids(&self) -> &[String] {
        &self.order
    }
}

/// `"<volume> <id with the marker replaced>.<ext>"`
///
/// Only the first marker occurrence is replaced, and the separator space is
/// kept in front of the replacement's own leading space, so `wideScreen12`
/// in volume `My Book` becomes `My Book  Page 12.jpg`.
pub fn page_file_name(volume_name: &str, element_id: &str, format: ImageFormat) -> String {
    format!(
        "{} {}.{}",
        volume_name,
        element_id.replacen(PAGE_ID_MARKER, PAGE_MARKER_REPLACEMENT, 1),
        format.extension()
    )
}

/// Swap the declared image type for a generic binary one
pub fn as_octet_stream(data_url: &str, format: ImageFormat) -> String {
    data_url.replacen(format.mime(), OCTET_STREAM, 1)
}

/// Export one element unless it was already exported.
///
/// Returns `Ok(true)` when a download was issued. The sink is not awaited
/// beyond its `deliver` call.
pub fn export_page(
    viewer: &mut dyn ViewerSurface,
    sink: &mut dyn DownloadSink,
    pages: &mut DownloadedPages,
    element: &PageElement,
    volume_name: &str,
    format: ImageFormat,
) -> Result<bool> {
    if pages.contains(&element.id) {
        return Ok(false);
    }

    let data_url = viewer.encode_image(element, format)?;
    let request = DownloadRequest {
        file_name: page_file_name(volume_name, &element.id, format),
        href: as_octet_stream(&data_url, format),
    };
    debug!("Exporting {} as {}", element.id, request.file_name);
    sink.deliver(request)?;
    pages.insert(&element.id);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::MemorySink;
    use crate::virtual_viewer::VirtualViewer;

    #[test]
    fn file_name_keeps_double_space() {
        assert_eq!(page_file_name("My Book", "wideScreen12", ImageFormat::default()), "My Book  Page 12.jpg");
        assert_eq!(page_file_name("Vol", "wideScreen3", ImageFormat::Png), "Vol  Page 3.png");
    }

    #[test]
    fn file_name_replaces_first_marker_only() {
        assert_eq!(
            page_file_name("V", "wideScreenwideScreen1", ImageFormat::default()),
            "V  Page wideScreen1.jpg"
        );
        assert_eq!(page_file_name("V", "cover", ImageFormat::default()), "V cover.jpg");
    }

    #[test]
    fn content_type_is_rewritten() {
        let url = "data:image/jpeg;base64,AAAA";
        assert_eq!(as_octet_stream(url, ImageFormat::default()), "data:image/octet-stream;base64,AAAA");
        let png = "data:image/png;base64,AAAA";
        assert_eq!(as_octet_stream(png, ImageFormat::Png), "data:image/octet-stream;base64,AAAA");
    }

    #[test]
    fn format_parsing() {
        assert_eq!("PNG".parse::<ImageFormat>().unwrap(), ImageFormat::Png);
        assert_eq!("jpg".parse::<ImageFormat>().unwrap().quality(), Some(DEFAULT_JPEG_QUALITY));
        assert!("gif".parse::<ImageFormat>().is_err());
    }

    #[test]
    fn second_export_of_same_id_is_a_no_op() {
        let mut viewer = VirtualViewer::new(3);
        let mut sink = MemorySink::new();
        let mut pages = DownloadedPages::new();
        let element = PageElement::new("wideScreen1");

        assert!(export_page(&mut viewer, &mut sink, &mut pages, &element, "Vol", ImageFormat::default()).unwrap());
        assert!(!export_page(&mut viewer, &mut sink, &mut pages, &element, "Vol", ImageFormat::default()).unwrap());

        let requests = sink.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].file_name, "Vol  Page 1.jpg");
        assert!(requests[0].href.starts_with("data:image/octet-stream;base64,"));
        assert_eq!(pages.ids(), ["wideScreen1".to_string()]);
        assert_eq!(viewer.encoded_ids(), ["wideScreen1".to_string()]);
    }

    #[test]
    fn downloaded_pages_dedupe() {
        let mut pages = DownloadedPages::new();
        assert!(pages.is_empty());
        assert!(pages.insert("a"));
        assert!(!pages.insert("a"));
        assert!(pages.insert("b"));
        assert_eq!(pages.len(), 2);
    }
}
