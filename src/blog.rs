//! Blog posts rendered from a directory of markdown files.
//!
//! Posts are read from disk on each request; the directory is small and the
//! pages are rarely visited, so no cache sits in front of it. A missing
//! directory serves an empty list.

use crate::error::SiteError;
use chrono::{DateTime, Utc};
use comrak::Options;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct BlogPost {
    pub title: String,
    /// Rendered HTML body.
    pub content: String,
    pub created: String,
}

pub fn load_posts(dir: &str) -> Result<Vec<BlogPost>, SiteError> {
    let dir_path = Path::new(dir);
    if !dir_path.is_dir() {
        return Ok(Vec::new());
    }

    let mut posts: Vec<(DateTime<Utc>, BlogPost)> = Vec::new();
    for entry in std::fs::read_dir(dir_path)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed reading post, skipping");
                continue;
            }
        };

        let modified: DateTime<Utc> = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());

        posts.push((modified, render_post(&path, &source, modified)));
    }

    posts.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(posts.into_iter().map(|(_, post)| post).collect())
}

fn render_post(path: &Path, source: &str, modified: DateTime<Utc>) -> BlogPost {
    let title = source
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .unwrap_or_else(|| title_from_filename(path));

    // Strip the title heading so it is not rendered twice.
    let body: String = source
        .lines()
        .skip_while(|line| line.trim().is_empty())
        .skip(if source.trim_start().starts_with("# ") { 1 } else { 0 })
        .collect::<Vec<_>>()
        .join("\n");

    BlogPost {
        title,
        content: comrak::markdown_to_html(&body, &Options::default()),
        created: modified.format("%Y-%m-%d").to_string(),
    }
}

fn title_from_filename(path: &Path) -> String {
    crate::cache::audio::title_case(
        &path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .replace(['_', '-'], " "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_yields_empty_list() {
        assert!(load_posts("/definitely/not/a/dir").unwrap().is_empty());
    }

    #[test]
    fn reads_title_from_heading_and_renders_markdown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("first_post.md"),
            "# Hello Fiddle\n\nSome *emphasis* here.\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("ignored.txt"), "not a post").unwrap();

        let posts = load_posts(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Hello Fiddle");
        assert!(posts[0].content.contains("<em>emphasis</em>"));
        assert!(!posts[0].content.contains("Hello Fiddle"));
    }

    #[test]
    fn falls_back_to_filename_title() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("road_to_boston.md"), "just text\n").unwrap();

        let posts = load_posts(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(posts[0].title, "Road To Boston");
    }
}
