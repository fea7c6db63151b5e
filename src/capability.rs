//! External tool capabilities.
//!
//! RAR is a proprietary format: Hako neither decodes nor encodes it natively.
//! Instead, the conversion engine is handed a [`Capabilities`] value holding
//! optional strategies for reading and writing RAR archives. [`Capabilities::detect`]
//! fills them from executables found on `PATH`; tests and embedders can inject
//! their own. A missing strategy surfaces as [`Error::CapabilityUnavailable`].

use std::ffi::OsString;
use std::fmt;
use std::path::{MAIN_SEPARATOR_STR, Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Executables probed, in order, for RAR extraction.
pub const RAR_READ_TOOLS: &[&str] = &["unrar", "unar", "7z", "7zz"];
/// Executables probed for RAR creation.
pub const RAR_WRITE_TOOLS: &[&str] = &["rar"];

/// Unpacks a RAR archive into a directory.
pub trait RarExtractor: Send + Sync + fmt::Debug {
    /// Name of the tool, for logs and error messages.
    fn name(&self) -> &str;

    /// Unpacks every entry of `archive` below `dest`, keeping directory structure.
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// Packs an ordered list of files into a RAR archive.
pub trait RarPacker: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Creates `output` holding `images` under their bare file names, in order.
    /// `output` does not exist when this is called.
    fn pack(&self, images: &[PathBuf], output: &Path) -> Result<()>;
}

/// Optional external-tool strategies available to a run.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub rar_extractor: Option<Arc<dyn RarExtractor>>,
    pub rar_packer: Option<Arc<dyn RarPacker>>,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field(
                "rar_extractor",
                &self.rar_extractor.as_ref().map(|t| t.name().to_string()),
            )
            .field(
                "rar_packer",
                &self.rar_packer.as_ref().map(|t| t.name().to_string()),
            )
            .finish()
    }
}

impl Capabilities {
    /// No external tools at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Looks up RAR tools on the host `PATH`.
    pub fn detect() -> Self {
        let rar_extractor = RAR_READ_TOOLS.iter().find_map(|tool| {
            which::which(tool).ok().map(|program| {
                log::debug!("Using '{}' for RAR extraction", program.display());
                Arc::new(ExternalRarExtractor::new(tool, program)) as Arc<dyn RarExtractor>
            })
        });
        let rar_packer = RAR_WRITE_TOOLS.iter().find_map(|tool| {
            which::which(tool).ok().map(|program| {
                log::debug!("Using '{}' for RAR creation", program.display());
                Arc::new(ExternalRarPacker { program }) as Arc<dyn RarPacker>
            })
        });

        Self {
            rar_extractor,
            rar_packer,
        }
    }

    pub fn with_rar_extractor(mut self, extractor: Arc<dyn RarExtractor>) -> Self {
        self.rar_extractor = Some(extractor);
        self
    }

    pub fn with_rar_packer(mut self, packer: Arc<dyn RarPacker>) -> Self {
        self.rar_packer = Some(packer);
        self
    }

    pub(crate) fn require_rar_extractor(&self) -> Result<Arc<dyn RarExtractor>> {
        self.rar_extractor
            .clone()
            .ok_or_else(|| Error::CapabilityUnavailable {
                capability: "RAR extraction".to_string(),
                tools: RAR_READ_TOOLS.iter().map(|t| t.to_string()).collect(),
            })
    }

    pub(crate) fn require_rar_packer(&self) -> Result<Arc<dyn RarPacker>> {
        self.rar_packer
            .clone()
            .ok_or_else(|| Error::CapabilityUnavailable {
                capability: "RAR creation".to_string(),
                tools: RAR_WRITE_TOOLS.iter().map(|t| t.to_string()).collect(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ExtractorFlavor {
    Unrar,
    Unar,
    SevenZip,
}

/// RAR extraction through `unrar`, `unar` or a 7-Zip build with the RAR codec.
#[derive(Debug)]
pub struct ExternalRarExtractor {
    name: String,
    program: PathBuf,
    flavor: ExtractorFlavor,
}

impl ExternalRarExtractor {
    fn new(tool: &str, program: PathBuf) -> Self {
        let flavor = match tool {
            "unrar" => ExtractorFlavor::Unrar,
            "unar" => ExtractorFlavor::Unar,
            _ => ExtractorFlavor::SevenZip,
        };
        Self {
            name: tool.to_string(),
            program,
            flavor,
        }
    }

    fn arguments(&self, archive: &Path, dest: &Path) -> Vec<OsString> {
        match self.flavor {
            ExtractorFlavor::Unrar => {
                // unrar treats the destination as a directory only with a trailing separator
                let mut dest_dir = dest.as_os_str().to_owned();
                dest_dir.push(MAIN_SEPARATOR_STR);
                vec![
                    "x".into(),
                    "-o+".into(),
                    "-y".into(),
                    "-idq".into(),
                    archive.into(),
                    dest_dir,
                ]
            }
            ExtractorFlavor::Unar => vec![
                "-q".into(),
                "-f".into(),
                "-D".into(),
                "-o".into(),
                dest.into(),
                archive.into(),
            ],
            ExtractorFlavor::SevenZip => {
                let mut out_flag = OsString::from("-o");
                out_flag.push(dest);
                vec!["x".into(), "-y".into(), out_flag, archive.into()]
            }
        }
    }
}

impl RarExtractor for ExternalRarExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let args = self.arguments(archive, dest);
        run_tool(&self.name, &self.program, &args).map_err(|e| match e {
            Error::ExternalTool { stderr, .. } => Error::corrupt(archive, stderr),
            other => other,
        })
    }
}

/// RAR creation through the `rar` executable.
#[derive(Debug)]
pub struct ExternalRarPacker {
    program: PathBuf,
}

impl RarPacker for ExternalRarPacker {
    fn name(&self) -> &str {
        "rar"
    }

    fn pack(&self, images: &[PathBuf], output: &Path) -> Result<()> {
        // -ep drops directory components so entries stay flat
        let mut args: Vec<OsString> = vec![
            "a".into(),
            "-ep".into(),
            "-idq".into(),
            "-y".into(),
            output.into(),
        ];
        args.extend(images.iter().map(|p| p.as_os_str().to_owned()));
        run_tool("rar", &self.program, &args)
    }
}

fn run_tool(name: &str, program: &Path, args: &[OsString]) -> Result<()> {
    log::debug!("Running {} {:?}", program.display(), args);
    let output = Command::new(program).args(args).output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(Error::ExternalTool {
            tool: name.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn missing_tools_are_typed() {
        let caps = Capabilities::none();
        let err = caps.require_rar_extractor().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapabilityUnavailable);
        assert!(err.to_string().contains("unrar"));
        let err = caps.require_rar_packer().unwrap_err();
        assert!(err.to_string().contains("rar"));
    }

    #[test]
    fn unrar_destination_has_trailing_separator() {
        let tool = ExternalRarExtractor::new("unrar", PathBuf::from("/usr/bin/unrar"));
        let args = tool.arguments(Path::new("a.cbr"), Path::new("/tmp/out"));
        let dest = args.last().unwrap().to_string_lossy().to_string();
        assert!(dest.ends_with(MAIN_SEPARATOR_STR));
    }

    #[test]
    fn seven_zip_output_flag_is_glued() {
        let tool = ExternalRarExtractor::new("7z", PathBuf::from("/usr/bin/7z"));
        let args = tool.arguments(Path::new("a.cbr"), Path::new("/tmp/out"));
        assert_eq!(args[2], OsString::from("-o/tmp/out"));
    }
}
