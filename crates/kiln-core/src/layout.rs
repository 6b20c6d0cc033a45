//! The asset directory tree.
//!
//! Every task reads from and writes to paths derived here, so the directory
//! contract lives in one place. Destination directories are write targets for
//! their owning task and read-only inputs for release assembly.

use std::path::{Path, PathBuf};

use crate::config::PathsConfig;

/// Fixed file name of the compiled stylesheet.
pub const CSS_OUTPUT: &str = "style.min.css";

/// Fixed file name of the minified script.
pub const JS_OUTPUT: &str = "main.min.js";

/// Source and destination directories for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Source root (`app`)
    pub root: PathBuf,

    /// Distributable root (`dist`)
    pub dist: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>, dist: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dist: dist.into(),
        }
    }

    /// Layout described by the `[paths]` config section, resolved against `base`.
    pub fn from_config(base: &Path, paths: &PathsConfig) -> Self {
        Self::new(base.join(&paths.source), base.join(&paths.dist))
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root.join("pages")
    }

    pub fn components_dir(&self) -> PathBuf {
        self.root.join("components")
    }

    /// HTML pages are written next to the source root.
    pub fn html_out_dir(&self) -> PathBuf {
        self.root.clone()
    }

    pub fn scss_dir(&self) -> PathBuf {
        self.root.join("scss")
    }

    pub fn style_entry(&self) -> PathBuf {
        self.scss_dir().join("style.scss")
    }

    pub fn css_dir(&self) -> PathBuf {
        self.root.join("css")
    }

    pub fn css_output(&self) -> PathBuf {
        self.css_dir().join(CSS_OUTPUT)
    }

    pub fn fonts_src_dir(&self) -> PathBuf {
        self.root.join("fonts").join("src")
    }

    pub fn fonts_dir(&self) -> PathBuf {
        self.root.join("fonts")
    }

    pub fn images_src_dir(&self) -> PathBuf {
        self.root.join("images").join("src")
    }

    pub fn images_dist_dir(&self) -> PathBuf {
        self.root.join("images").join("dist")
    }

    pub fn js_dir(&self) -> PathBuf {
        self.root.join("js")
    }

    pub fn script_entry(&self) -> PathBuf {
        self.js_dir().join("main.js")
    }

    pub fn js_output(&self) -> PathBuf {
        self.js_dir().join(JS_OUTPUT)
    }

    /// Directory for kiln's own bookkeeping (image cache manifest).
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(".kiln")
    }

    /// Convert a path under the source root into a URL path (`/css/style.min.css`).
    pub fn url_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        format!("/{}", parts.join("/"))
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new("app", "dist")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_fixed_locations() {
        let layout = Layout::new("/site/app", "/site/dist");

        assert_eq!(layout.style_entry(), PathBuf::from("/site/app/scss/style.scss"));
        assert_eq!(layout.css_output(), PathBuf::from("/site/app/css/style.min.css"));
        assert_eq!(layout.js_output(), PathBuf::from("/site/app/js/main.min.js"));
        assert_eq!(layout.images_dist_dir(), PathBuf::from("/site/app/images/dist"));
        assert_eq!(layout.fonts_src_dir(), PathBuf::from("/site/app/fonts/src"));
    }

    #[test]
    fn maps_paths_to_urls() {
        let layout = Layout::new("/site/app", "/site/dist");
        assert_eq!(layout.url_path(&layout.css_output()), "/css/style.min.css");
    }
}
