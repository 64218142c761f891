//! Per-vendor stream layouts.

use tardet_types::{Company, VendorKind};

/// Scheme and path of a vendor's main stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamProfile {
    pub scheme: String,
    pub path: String,
}

impl StreamProfile {
    /// Built-in layout for a vendor family.
    pub fn builtin(vendor: VendorKind) -> Self {
        let path = match vendor {
            VendorKind::Hikvision => "/Streaming/Channels/101",
            VendorKind::Dahua => "/cam/realmonitor?channel=1&subtype=0",
            VendorKind::Uniview => "/media/video1",
            VendorKind::Generic => "/",
        };
        Self {
            scheme: "rtsp".to_string(),
            path: path.to_string(),
        }
    }

    /// Layout for a company: its overrides on top of the vendor table.
    pub fn for_company(company: &Company) -> Self {
        let mut profile = Self::builtin(company.vendor);
        if let Some(scheme) = company.stream_scheme.as_deref().filter(|s| !s.is_empty()) {
            profile.scheme = scheme.to_string();
        }
        if let Some(path) = company.stream_path.as_deref().filter(|p| !p.is_empty()) {
            profile.path = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{}", path)
            };
        }
        profile
    }
}
