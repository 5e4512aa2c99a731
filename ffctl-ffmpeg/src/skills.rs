use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tokio::process::Command;

use crate::{Error, Result};

/// A codec with its available encoder and decoder implementations.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Codec {
    pub id: String,
    pub name: String,
    pub encoders: Vec<String>,
    pub decoders: Vec<String>,
}

/// A named capability (filter, format, protocol, hwaccel).
#[derive(Debug, Default, Clone, Serialize)]
pub struct Capability {
    pub id: String,
    pub name: String,
}

/// A linked libav* library with compiled and linked versions.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Library {
    pub name: String,
    pub compiled: String,
    pub linked: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct BinaryInfo {
    pub version: String,
    pub compiler: String,
    pub configuration: String,
    pub libraries: Vec<Library>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct CodecSkills {
    pub audio: Vec<Codec>,
    pub video: Vec<Codec>,
    pub subtitle: Vec<Codec>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct FormatSkills {
    pub demuxers: Vec<Capability>,
    pub muxers: Vec<Capability>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ProtocolSkills {
    pub input: Vec<Capability>,
    pub output: Vec<Capability>,
}

/// Everything the transcoder binary reports being able to do.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Skills {
    pub ffmpeg: BinaryInfo,
    #[serde(rename = "filter")]
    pub filters: Vec<Capability>,
    pub hwaccels: Vec<Capability>,
    pub codecs: CodecSkills,
    pub formats: FormatSkills,
    pub protocols: ProtocolSkills,
}

impl Skills {
    /// Probe the binary. An unparsable version line is an error; every
    /// other capability listing is best-effort.
    pub async fn detect(binary: &Path) -> Result<Self> {
        let version = run(binary, "-version").await.map_err(Error::InvalidBinary)?;
        let ffmpeg = parse_version(&version);
        if ffmpeg.version.is_empty() {
            return Err(Error::Version);
        }

        Ok(Self {
            ffmpeg,
            filters: parse_filters(&run(binary, "-filters").await.unwrap_or_default()),
            hwaccels: parse_hwaccels(&run(binary, "-hwaccels").await.unwrap_or_default()),
            codecs: parse_codecs(&run(binary, "-codecs").await.unwrap_or_default()),
            formats: parse_formats(&run(binary, "-formats").await.unwrap_or_default()),
            protocols: parse_protocols(&run(binary, "-protocols").await.unwrap_or_default()),
        })
    }
}

async fn run(binary: &Path, flag: &str) -> std::result::Result<String, String> {
    let output = Command::new(binary)
        .arg(flag)
        .env_clear()
        .output()
        .await
        .map_err(|err| format!("{}: {err}", binary.display()))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

static RE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ffmpeg version ([0-9]+\.[0-9]+(\.[0-9]+)?)").unwrap());
static RE_COMPILER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*built with (.*)$").unwrap());
static RE_CONFIGURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*configuration: (.*)$").unwrap());
static RE_LIBRARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(lib[a-z]+)\s+([0-9]+\.\s*[0-9]+\.\s*[0-9]+) /\s+([0-9]+\.\s*[0-9]+\.\s*[0-9]+)").unwrap()
});

fn parse_version(data: &str) -> BinaryInfo {
    let mut info = BinaryInfo::default();

    if let Some(caps) = RE_VERSION.captures(data) {
        info.version = caps[1].to_string();
        if caps.get(2).is_none() {
            info.version.push_str(".0");
        }
    }
    if let Some(caps) = RE_COMPILER.captures(data) {
        info.compiler = caps[1].trim().to_string();
    }
    if let Some(caps) = RE_CONFIGURATION.captures(data) {
        info.configuration = caps[1].trim().to_string();
    }
    for caps in RE_LIBRARY.captures_iter(data) {
        info.libraries.push(Library {
            name: caps[1].to_string(),
            compiled: caps[2].to_string(),
            linked: caps[3].to_string(),
        });
    }

    info
}

static RE_FILTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s[TSC.]{3} ([0-9A-Za-z_]+)\s+\S+\s+(.*)$").unwrap());

fn parse_filters(data: &str) -> Vec<Capability> {
    data.lines()
        .filter_map(|line| RE_FILTER.captures(line))
        .map(|caps| Capability {
            id: caps[1].to_string(),
            name: caps[2].trim().to_string(),
        })
        .collect()
}

static RE_CODEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s([D.])([E.])([VAS]).{3} ([0-9A-Za-z_]+)\s+(.*?)(?:\(decoders:([^)]+)\))?\s?(?:\(encoders:([^)]+)\))?$",
    )
    .unwrap()
});

fn parse_codecs(data: &str) -> CodecSkills {
    let mut skills = CodecSkills::default();

    for line in data.lines() {
        let Some(caps) = RE_CODEC.captures(line) else {
            continue;
        };

        let id = caps[4].to_string();
        let mut codec = Codec {
            id: id.clone(),
            name: caps[5].trim().to_string(),
            ..Default::default()
        };

        if &caps[1] == "D" {
            codec.decoders = match caps.get(6) {
                Some(list) => split_names(list.as_str()),
                None => vec![id.clone()],
            };
        }
        if &caps[2] == "E" {
            codec.encoders = match caps.get(7) {
                Some(list) => split_names(list.as_str()),
                None => vec![id],
            };
        }

        match &caps[3] {
            "V" => skills.video.push(codec),
            "A" => skills.audio.push(codec),
            "S" => skills.subtitle.push(codec),
            _ => {}
        }
    }

    skills
}

fn split_names(list: &str) -> Vec<String> {
    list.split_whitespace().map(str::to_string).collect()
}

static RE_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s([D ])([E ]) ([0-9A-Za-z_,]+)\s+(.*?)$").unwrap());

fn parse_formats(data: &str) -> FormatSkills {
    let mut skills = FormatSkills::default();

    for line in data.lines() {
        let Some(caps) = RE_FORMAT.captures(line) else {
            continue;
        };

        // A muxer/demuxer pair may be listed under aliased ids; the
        // first one is canonical.
        let id = caps[3].split(',').next().unwrap_or_default().to_string();
        let format = Capability {
            id,
            name: caps[4].to_string(),
        };

        if &caps[1] == "D" {
            skills.demuxers.push(format.clone());
        }
        if &caps[2] == "E" {
            skills.muxers.push(format);
        }
    }

    skills
}

fn parse_protocols(data: &str) -> ProtocolSkills {
    let mut skills = ProtocolSkills::default();
    let mut section = "";

    for line in data.lines() {
        match line {
            "Input:" => {
                section = "input";
                continue;
            }
            "Output:" => {
                section = "output";
                continue;
            }
            _ => {}
        }

        let id = line.trim();
        if id.is_empty() {
            continue;
        }
        let protocol = Capability {
            id: id.to_string(),
            name: id.to_string(),
        };

        match section {
            "input" => skills.input.push(protocol),
            "output" => skills.output.push(protocol),
            _ => {}
        }
    }

    skills
}

static RE_HWACCEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

fn parse_hwaccels(data: &str) -> Vec<Capability> {
    let mut accels = Vec::new();
    let mut listing = false;

    for line in data.lines() {
        if line == "Hardware acceleration methods:" {
            listing = true;
            continue;
        }
        if !listing || !RE_HWACCEL.is_match(line) {
            continue;
        }
        accels.push(Capability {
            id: line.to_string(),
            name: line.to_string(),
        });
    }

    accels
}
