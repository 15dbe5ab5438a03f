// src/scan/listing.rs

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::config::ScannerSettings;
use crate::exec::{expand_template, CommandRunner};
use crate::model::FileDescriptor;

/// One parsed line of listing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEntry {
    File { path: String, size: u64 },
    Directory { path: String },
}

/// Applies the configured `parse_re` to listing lines.
///
/// The regex must provide named groups `type`, `size` and `path`; entry
/// types `f` and `-` are files, `d` is a directory. Unparseable lines and
/// unknown entry types are skipped, never fatal.
#[derive(Debug, Clone)]
pub struct ListingParser {
    re: Regex,
}

impl ListingParser {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            re: Regex::new(pattern)?,
        })
    }

    pub fn parse_line(&self, line: &str) -> Option<ListingEntry> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let caps = match self.re.captures(line) {
            Some(c) => c,
            None => {
                debug!(line, "listing line did not match parse pattern; skipped");
                return None;
            }
        };

        let kind = caps.name("type")?.as_str();
        let path = caps.name("path")?.as_str().to_string();
        match kind {
            "f" | "-" => {
                let size: u64 = match caps.name("size")?.as_str().parse() {
                    Ok(s) => s,
                    Err(_) => {
                        debug!(line, "unparseable size in listing line; skipped");
                        return None;
                    }
                };
                Some(ListingEntry::File { path, size })
            }
            "d" => Some(ListingEntry::Directory { path }),
            other => {
                warn!(line, kind = other, "unknown directory entry type; ignored");
                None
            }
        }
    }
}

/// Files and subdirectories found under one location.
#[derive(Debug, Default)]
pub struct Listing {
    pub files: Vec<FileDescriptor>,
    pub dirs: Vec<String>,
}

/// Lists remote directories through the external listing command.
///
/// Also used by the mover for the destination-size probe and by the
/// manager for the quarantine listing.
pub struct Lister {
    runner: Arc<dyn CommandRunner>,
    ls_command_template: String,
    parser: ListingParser,
    timeout: Duration,
}

impl Lister {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: &ScannerSettings) -> Result<Self> {
        Ok(Self {
            runner,
            ls_command_template: settings.ls_command_template.clone(),
            parser: ListingParser::new(&settings.parse_re)?,
            timeout: settings.op_timeout,
        })
    }

    /// List one directory, returning file descriptors and subdirectory
    /// paths. A failing listing command is an error; the caller decides
    /// whether that is fatal.
    pub async fn list(&self, server: &str, location: &str) -> Result<Listing> {
        let command = expand_template(
            &self.ls_command_template,
            &[("server", server), ("location", location)],
        );
        let outcome = self.runner.run(&command, self.timeout).await;
        if !outcome.success() {
            bail!("listing of {server}:{location} failed: {}", outcome.error_text());
        }

        let mut out = Listing::default();
        for line in outcome.output.lines() {
            match self.parser.parse_line(line) {
                Some(ListingEntry::File { path, size }) => {
                    let path = qualify(&path, location);
                    if size == 0 {
                        debug!(path, "zero-size file in listing");
                    }
                    match FileDescriptor::new(server, location, path, size) {
                        Ok(desc) => out.files.push(desc),
                        Err(e) => warn!(error = %e, "skipping listing entry"),
                    }
                }
                Some(ListingEntry::Directory { path }) => {
                    out.dirs.push(qualify(&path, location));
                }
                None => {}
            }
        }
        Ok(out)
    }

    /// List a location, optionally descending into subdirectories
    /// depth-first. A listing failure on a subdirectory is logged and that
    /// subtree's files are simply absent this cycle; only the top-level
    /// listing failure is an error.
    pub async fn list_under(
        &self,
        server: &str,
        location: &str,
        recursive: bool,
    ) -> Result<Vec<FileDescriptor>> {
        let top = self.list(server, location).await?;
        let mut files = top.files;

        if recursive {
            let mut stack = top.dirs;
            while let Some(dir) = stack.pop() {
                match self.list(server, &dir).await {
                    Ok(mut listing) => {
                        // Sub-listings report paths under the original scan
                        // root so rel_path stays rooted at `location`.
                        for f in &mut listing.files {
                            if let Ok(desc) =
                                FileDescriptor::new(server, location, f.path.clone(), f.size)
                            {
                                files.push(desc);
                            }
                        }
                        stack.extend(listing.dirs);
                    }
                    Err(e) => {
                        warn!(dir, error = %e, "subdirectory listing failed; skipping subtree");
                    }
                }
            }
        }
        Ok(files)
    }

    /// Size of a single remote file, or `None` when it does not exist.
    pub async fn file_size(&self, server: &str, path: &str) -> Result<Option<u64>> {
        let command = expand_template(
            &self.ls_command_template,
            &[("server", server), ("location", path)],
        );
        let outcome = self.runner.run(&command, self.timeout).await;
        if !outcome.success() {
            if outcome.output.to_lowercase().contains("no such file") {
                return Ok(None);
            }
            bail!("stat of {server}:{path} failed: {}", outcome.error_text());
        }
        for line in outcome.output.lines() {
            if let Some(ListingEntry::File { path: p, size }) = self.parser.parse_line(line) {
                if p == path {
                    return Ok(Some(size));
                }
            }
        }
        Ok(None)
    }
}

fn qualify(path: &str, location: &str) -> String {
    if path.starts_with(location) {
        path.to_string()
    } else {
        format!("{}/{}", location.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}
