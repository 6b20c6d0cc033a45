//! Scaffold a source tree in a project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Files written by `init`, relative to the project directory.
const SCAFFOLD: [(&str, &str); 8] = [
    ("kiln.toml", DEFAULT_CONFIG),
    ("app/pages/index.html", DEFAULT_INDEX),
    ("app/components/header.html", DEFAULT_HEADER),
    ("app/components/footer.html", DEFAULT_FOOTER),
    ("app/scss/style.scss", DEFAULT_STYLE),
    ("app/scss/_layout.scss", DEFAULT_LAYOUT),
    ("app/js/main.js", DEFAULT_SCRIPT),
    ("app/.gitignore", DEFAULT_GITIGNORE),
];

/// Empty staging directories.
const STAGING_DIRS: [&str; 2] = ["app/fonts/src", "app/images/src"];

/// Run the init command in `base`.
pub fn run(base: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing kiln...");

    let app_dir = base.join("app");
    if app_dir.exists() && !yes {
        tracing::warn!("app/ directory already exists. Use --yes to overwrite.");
        return Ok(());
    }

    for dir in STAGING_DIRS {
        let path = base.join(dir);
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }

    for (relative, content) in SCAFFOLD {
        let path = base.join(relative);
        if path.exists() && !yes {
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {relative}"))?;
        tracing::info!("Created {}", relative);
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'kiln' to build, serve and watch.");

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# kiln configuration

[paths]
# Source root: pages, components, scss, fonts, images, js
source = "app"

# Release output
dist = "dist"

[styles]
browsers = ["last 10 versions"]
# Add -ms- grid fallbacks
grid = true
minify = true

[images]
avif_quality = 50
webp_quality = 75
jpeg_quality = 75
# oxipng preset, 0-6
png_level = 5
# "hash" compares source content, "mtime" compares timestamps
cache = "hash"

[scripts]
mangle = true

[server]
host = "127.0.0.1"
port = 3000
open = true

[watch]
debounce_ms = 150
"#;

const DEFAULT_INDEX: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Home</title>
  <link rel="stylesheet" href="css/style.min.css">
</head>
<body>
  <!--=include header.html -->
  <main class="page">
    <h1>Hello from kiln</h1>
    <p>Edit <code>app/pages/index.html</code> and save to rebuild.</p>
  </main>
  @@include('footer.html')
  <script src="js/main.min.js"></script>
</body>
</html>
"#;

const DEFAULT_HEADER: &str = r#"<header class="site-header">
  <a href="/" class="logo">Site</a>
</header>
"#;

const DEFAULT_FOOTER: &str = r#"<footer class="site-footer">
  <p>Built with kiln</p>
</footer>
"#;

const DEFAULT_STYLE: &str = r#"@import "layout";

$text: #1d1d1f;

body {
  margin: 0;
  font-family: system-ui, sans-serif;
  color: $text;
}
"#;

const DEFAULT_LAYOUT: &str = r#".page {
  display: grid;
  grid-template-columns: 1fr 3fr;
  gap: 1rem;
  padding: 2rem;
}
"#;

const DEFAULT_SCRIPT: &str = r#"function greet(name) {
  const message = 'Hello, ' + name;
  console.log(message);
}

greet('kiln');
"#;

const DEFAULT_GITIGNORE: &str = r#".kiln/
"#;
