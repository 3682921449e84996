use anyhow::{Context, Result};
use memmap2::Mmap;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

pub enum FileContent {
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl FileContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContent::Mapped(mmap) => mmap,
            FileContent::Buffered(bytes) => bytes,
        }
    }

    /// Invalid UTF-8 is replaced rather than rejected; prompts are best effort.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

pub fn read_file_smart<P: AsRef<Path>>(path: P) -> io::Result<FileContent> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)?;

    if metadata.len() > MMAP_THRESHOLD {
        let file = File::open(path)?;

        // Safety: the map is read-only and dropped before we return text to callers
        let mmap = unsafe { Mmap::map(&file) }?;

        Ok(FileContent::Mapped(mmap))
    } else {
        Ok(FileContent::Buffered(std::fs::read(path)?))
    }
}

/// Whole file as text.
pub fn read_text<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let content = read_file_smart(path)?;
    Ok(content.text().into_owned())
}

pub fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read stdin")?;
    Ok(buf)
}

pub fn read_clipboard() -> Result<String> {
    let mut clipboard = arboard::Clipboard::new().context("Failed to access clipboard")?;
    clipboard
        .get_text()
        .context("Clipboard holds no text")
}

pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().context("Failed to access clipboard")?;
    clipboard
        .set_text(text.to_owned())
        .context("Failed to copy to clipboard")?;
    Ok(())
}

/// Write `text` to `path`, or stdout when no path is given.
pub fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))
        }
        None => {
            let mut out = io::stdout().lock();
            out.write_all(text.as_bytes())
                .and_then(|_| out.flush())
                .context("Failed to write to stdout")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_small_and_large_files() -> Result<()> {
        let dir = TempDir::new()?;
        let small = dir.path().join("small.txt");
        std::fs::write(&small, "hello\n")?;
        assert_eq!(read_text(&small)?, "hello\n");

        let large = dir.path().join("large.txt");
        let body = "x".repeat((MMAP_THRESHOLD + 10) as usize);
        std::fs::write(&large, &body)?;
        assert!(matches!(read_file_smart(&large)?, FileContent::Mapped(_)));
        assert_eq!(read_text(&large)?.len(), body.len());
        Ok(())
    }

    #[test]
    fn invalid_utf8_is_replaced() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("bin");
        std::fs::write(&path, [b'a', 0xff, b'b'])?;
        assert_eq!(read_text(&path)?, "a\u{fffd}b");
        Ok(())
    }

    #[test]
    fn write_output_creates_parent_dirs() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("out/nested/prompt.md");
        write_output(Some(&path), "done")?;
        assert_eq!(std::fs::read_to_string(&path)?, "done");
        Ok(())
    }
}
