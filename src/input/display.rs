//! Display resize, DPI, and cursor-size control via host CLI tools (§4.7).
//!
//! DE detection order is KDE -> XFCE -> MATE -> i3 -> Openbox -> generic;
//! MATE additionally runs the generic `xrdb` fallback for wider application
//! compatibility.

use tokio::process::Command;
use tracing::{info, warn};

use super::DisplayControl;
use crate::error::Result;

/// Minimal `which`: true if `name` resolves to an executable file on `$PATH`.
fn which(name: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| {
                let candidate = dir.join(name);
                candidate.is_file()
            })
        })
        .unwrap_or(false)
}

/// Fit `(w, h)` within `(max_w, max_h)` preserving aspect ratio, then force
/// both dimensions even. §8 boundary property: holds for any positive w, h.
pub fn fit_res(w: u32, h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if w <= max_w && h <= max_h {
        return (w - w % 2, h - h % 2);
    }
    let aspect = w as f64 / h as f64;
    let (mut w, mut h) = (w, h);
    if w > max_w {
        w = max_w;
        h = (w as f64 / aspect) as u32;
    }
    if h > max_h {
        h = max_h;
        w = (h as f64 * aspect) as u32;
    }
    (w - w % 2, h - h % 2)
}

const MAX_WIDTH: u32 = 7680;
const MAX_HEIGHT: u32 = 4320;

pub struct XrandrDisplay {
    screen_name: Option<String>,
}

impl XrandrDisplay {
    pub fn new() -> Self {
        Self { screen_name: None }
    }

    async fn detect_screen() -> Option<String> {
        let output = Command::new("xrandr").output().await.ok()?;
        let text = String::from_utf8_lossy(&output.stdout);
        for line in text.lines() {
            if let Some((name, rest)) = line.split_once(' ') {
                if rest.starts_with("connected") {
                    return Some(name.to_string());
                }
            }
        }
        None
    }

    async fn run_xrdb(dpi: u32) -> bool {
        if !which("xrdb") {
            return false;
        }
        let contents = format!("Xft.dpi: {dpi}\n");
        let path = std::env::temp_dir().join("selkies-xresources");
        if tokio::fs::write(&path, contents).await.is_err() {
            return false;
        }
        match Command::new("xrdb").arg(&path).status().await {
            Ok(status) if status.success() => true,
            _ => false,
        }
    }

    async fn run_xfconf(dpi: u32) -> bool {
        if !which("xfconf-query") {
            return false;
        }
        let status = Command::new("xfconf-query")
            .args(["-c", "xsettings", "-p", "/Xft/DPI", "-s", &dpi.to_string(), "--create", "-t", "int"])
            .status()
            .await;
        matches!(status, Ok(s) if s.success())
    }

    async fn run_mate_gsettings(dpi: u32) -> bool {
        if !which("gsettings") {
            return false;
        }
        let scale = (dpi as f64 / 96.0).round().max(1.0) as u32;
        let scale_ok = Command::new("gsettings")
            .args(["set", "org.mate.interface", "window-scaling-factor", &scale.to_string()])
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);
        let font_ok = Command::new("gsettings")
            .args(["set", "org.mate.font-rendering", "dpi", &dpi.to_string()])
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);
        scale_ok || font_ok
    }
}

impl Default for XrandrDisplay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DisplayControl for XrandrDisplay {
    async fn resize(&self, width: u32, height: u32) -> Result<bool> {
        if width == 0 || height == 0 {
            return Ok(false);
        }
        let (width, height) = fit_res(width, height, MAX_WIDTH, MAX_HEIGHT);
        let screen = match &self.screen_name {
            Some(s) => s.clone(),
            None => match Self::detect_screen().await {
                Some(s) => s,
                None => {
                    warn!("could not determine connected screen from xrandr");
                    return Ok(false);
                }
            },
        };

        let mode = format!("{width}x{height}");
        let status = Command::new("xrandr")
            .args(["--output", &screen, "--mode", &mode])
            .status()
            .await;

        match status {
            Ok(s) if s.success() => {
                info!(%mode, %screen, "display resized");
                Ok(true)
            }
            _ => {
                warn!(%mode, %screen, "xrandr resize failed");
                Ok(false)
            }
        }
    }

    async fn set_dpi(&self, dpi: u32) -> Result<bool> {
        if dpi == 0 {
            return Ok(false);
        }

        let succeeded = if which("startplasma-x11") {
            Self::run_xrdb(dpi).await
        } else if which("xfce4-session") {
            Self::run_xfconf(dpi).await
        } else if which("mate-session") {
            let gsettings_ok = Self::run_mate_gsettings(dpi).await;
            let xrdb_ok = Self::run_xrdb(dpi).await;
            gsettings_ok || xrdb_ok
        } else if which("i3") {
            Self::run_xrdb(dpi).await
        } else if which("openbox-session") || which("openbox") {
            Self::run_xrdb(dpi).await
        } else {
            Self::run_xrdb(dpi).await
        };

        if !succeeded {
            warn!(dpi, "no dpi setting method succeeded");
        }
        Ok(succeeded)
    }

    async fn set_cursor_size(&self, pixels: u32) -> Result<bool> {
        if pixels == 0 {
            return Ok(false);
        }

        if which("xfconf-query") {
            let status = Command::new("xfconf-query")
                .args(["-c", "xsettings", "-p", "/Gtk/CursorThemeSize", "-s", &pixels.to_string(), "--create", "-t", "int"])
                .status()
                .await;
            if matches!(status, Ok(s) if s.success()) {
                return Ok(true);
            }
            warn!("failed to set xfce cursor size");
        }

        if which("gsettings") {
            let status = Command::new("gsettings")
                .args(["set", "org.gnome.desktop.interface", "cursor-size", &pixels.to_string()])
                .status()
                .await;
            if matches!(status, Ok(s) if s.success()) {
                return Ok(true);
            }
            warn!("failed to set gnome cursor-size");
        }

        warn!(pixels, "no supported tool found to set cursor size");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_res_leaves_small_sizes_alone_but_forces_even() {
        assert_eq!(fit_res(1920, 1080, 7680, 4320), (1920, 1080));
        assert_eq!(fit_res(1921, 1081, 7680, 4320), (1920, 1080));
    }

    #[test]
    fn fit_res_scales_down_preserving_aspect() {
        let (w, h) = fit_res(15360, 8640, 7680, 4320);
        assert!(w <= 7680 && h <= 4320);
        assert_eq!(w % 2, 0);
        assert_eq!(h % 2, 0);
    }

    #[test]
    fn fit_res_handles_arbitrary_positive_input() {
        for (w, h) in [(1u32, 1u32), (9999, 3), (3, 9999), (7681, 4321)] {
            let (fw, fh) = fit_res(w, h, 7680, 4320);
            assert!(fw <= 7680 && fh <= 4320);
            assert_eq!(fw % 2, 0);
            assert_eq!(fh % 2, 0);
        }
    }
}
