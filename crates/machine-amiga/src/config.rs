//! Live machine description: model presets and JSON overrides.
//!
//! A preset fills every field. A JSON description can name a preset with
//! `"model"` and override individual fields, or describe a machine from
//! scratch.

use std::fmt;
#[cfg(feature = "native")]
use std::path::Path;

use stateload_core::EntryOffsets;
use stateload_core::map::attn;
use thiserror::Error;

const KB: u32 = 1024;
const MB: u32 = 1024 * 1024;

/// Amiga model presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "native", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "native", serde(rename_all = "lowercase"))]
pub enum AmigaModel {
    /// A500 (OCS, 512K chip, 512K trapdoor slow RAM, Kickstart 1.3).
    A500,
    /// A500+ (ECS, 1MB chip, Kickstart 2.04).
    A500Plus,
    /// A600 (ECS, 1MB chip, Kickstart 2.05).
    A600,
    /// A1200 (AGA, 2MB chip) with 4MB trapdoor fast RAM.
    A1200,
    /// A3000 (ECS, 68030, 2MB chip, 4MB motherboard fast RAM).
    A3000,
    /// A4000/030 (AGA, 2MB chip, 4MB motherboard fast RAM).
    A4000,
}

impl AmigaModel {
    pub const ALL: [Self; 6] = [
        Self::A500,
        Self::A500Plus,
        Self::A600,
        Self::A1200,
        Self::A3000,
        Self::A4000,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::A500 => "a500",
            Self::A500Plus => "a500plus",
            Self::A600 => "a600",
            Self::A1200 => "a1200",
            Self::A3000 => "a3000",
            Self::A4000 => "a4000",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigError::UnknownModel(name.to_string()))
    }
}

impl fmt::Display for AmigaModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Chipset generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "native", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "native", serde(rename_all = "lowercase"))]
pub enum Chipset {
    Ocs,
    Ecs,
    Aga,
}

/// Video region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "native", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "native", serde(rename_all = "lowercase"))]
pub enum Region {
    /// 312 lines per frame.
    Pal,
    /// 262 lines per frame.
    Ntsc,
}

impl Region {
    #[must_use]
    pub const fn lines_per_frame(self) -> u16 {
        match self {
            Self::Pal => 312,
            Self::Ntsc => 262,
        }
    }
}

/// A RAM block outside the three fixed bank addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "native", derive(serde::Serialize, serde::Deserialize))]
pub struct RamSpec {
    pub base: u32,
    pub size: u32,
}

/// Full description of the simulated live machine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "native", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "native", serde(default))]
pub struct MachineConfig {
    /// CPU part number: 68000, 68010, 68020, 68030, 68040 or 68060.
    pub cpu: u32,
    pub chipset: Chipset,
    pub region: Region,
    /// Chip RAM size in bytes.
    pub chip_ram: u32,
    /// Slow (Ranger/trapdoor) RAM at $C00000.
    pub slow_ram: u32,
    /// Zorro II fast RAM at $200000.
    pub fast_ram: u32,
    /// Further fast RAM regions (motherboard or 32-bit expansion).
    pub extra_ram: Vec<RamSpec>,
    pub kickstart_version: u16,
    pub kickstart_revision: u16,
    /// Kickstart image size: 256K or 512K.
    pub rom_size: u32,
    /// Starting cylinder of each connected drive, DF0 first.
    pub drives: Vec<u32>,
    /// Size of the loader's own code segment.
    pub code_size: u32,
    /// Entry points inside the code segment.
    #[cfg_attr(feature = "native", serde(skip, default = "loader_entries"))]
    pub entries: EntryOffsets,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self::preset(AmigaModel::A1200)
    }
}

/// Code layout of the loader as linked: trampoline first, then the inflate
/// routine, then register replay.
pub const LOADER_ENTRIES: EntryOffsets = EntryOffsets {
    trampoline: 0x0040,
    inflate: 0x0C00,
    replay: 0x1E00,
};

#[cfg(feature = "native")]
fn loader_entries() -> EntryOffsets {
    LOADER_ENTRIES
}

/// Loader code segment size.
pub const LOADER_CODE_SIZE: u32 = 0x5800;

impl MachineConfig {
    /// Create a preset configuration for the given model.
    #[must_use]
    pub fn preset(model: AmigaModel) -> Self {
        let base = Self {
            cpu: 68000,
            chipset: Chipset::Ocs,
            region: Region::Pal,
            chip_ram: 512 * KB,
            slow_ram: 0,
            fast_ram: 0,
            extra_ram: Vec::new(),
            kickstart_version: 34,
            kickstart_revision: 5,
            rom_size: 256 * KB,
            drives: vec![0],
            code_size: LOADER_CODE_SIZE,
            entries: LOADER_ENTRIES,
        };
        match model {
            AmigaModel::A500 => Self {
                slow_ram: 512 * KB,
                ..base
            },
            AmigaModel::A500Plus => Self {
                chipset: Chipset::Ecs,
                chip_ram: MB,
                kickstart_version: 37,
                kickstart_revision: 175,
                rom_size: 512 * KB,
                ..base
            },
            AmigaModel::A600 => Self {
                chipset: Chipset::Ecs,
                chip_ram: MB,
                kickstart_version: 37,
                kickstart_revision: 300,
                rom_size: 512 * KB,
                ..base
            },
            AmigaModel::A1200 => Self {
                cpu: 68020,
                chipset: Chipset::Aga,
                chip_ram: 2 * MB,
                fast_ram: 4 * MB,
                kickstart_version: 40,
                kickstart_revision: 68,
                rom_size: 512 * KB,
                ..base
            },
            AmigaModel::A3000 => Self {
                cpu: 68030,
                chipset: Chipset::Ecs,
                chip_ram: 2 * MB,
                extra_ram: vec![RamSpec {
                    base: 0x07C0_0000,
                    size: 4 * MB,
                }],
                kickstart_version: 40,
                kickstart_revision: 68,
                rom_size: 512 * KB,
                drives: vec![0, 0],
                ..base
            },
            AmigaModel::A4000 => Self {
                cpu: 68030,
                chipset: Chipset::Aga,
                chip_ram: 2 * MB,
                extra_ram: vec![RamSpec {
                    base: 0x07C0_0000,
                    size: 4 * MB,
                }],
                kickstart_version: 40,
                kickstart_revision: 70,
                rom_size: 512 * KB,
                drives: vec![0, 0],
                ..base
            },
        }
    }

    /// `ExecBase->AttnFlags` for the configured CPU.
    #[must_use]
    pub fn attn_flags(&self) -> u16 {
        match self.cpu {
            68010 => attn::AFF_68010,
            68020 => attn::AFF_68010 | attn::AFF_68020,
            68030 => attn::AFF_68010 | attn::AFF_68020 | attn::AFF_68030,
            68040 => attn::AFF_68010 | attn::AFF_68020 | attn::AFF_68030 | attn::AFF_68040,
            68060 => {
                attn::AFF_68010
                    | attn::AFF_68020
                    | attn::AFF_68030
                    | attn::AFF_68040
                    | attn::AFF_68060
            }
            _ => 0,
        }
    }

    /// Agnus/Alice ID bits as they appear in VPOSR.
    #[must_use]
    pub fn vposr_id(&self) -> u16 {
        let id = match self.chipset {
            Chipset::Ocs => 0x00,
            Chipset::Ecs => 0x20,
            Chipset::Aga => 0x23,
        };
        let ntsc = if self.region == Region::Ntsc { 0x10 } else { 0 };
        (id | ntsc) << 8
    }

    /// Check sizes and placement against the Amiga address map.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.cpu, 68000 | 68010 | 68020 | 68030 | 68040 | 68060) {
            return Err(ConfigError::Cpu(self.cpu));
        }
        if self.chip_ram == 0 || self.chip_ram > 2 * MB || self.chip_ram % (256 * KB) != 0 {
            return Err(ConfigError::RamSize {
                what: "chip",
                size: self.chip_ram,
            });
        }
        if self.slow_ram > 0x1C_0000 || self.slow_ram % (256 * KB) != 0 {
            return Err(ConfigError::RamSize {
                what: "slow",
                size: self.slow_ram,
            });
        }
        if self.fast_ram > 8 * MB || self.fast_ram % (64 * KB) != 0 {
            return Err(ConfigError::RamSize {
                what: "fast",
                size: self.fast_ram,
            });
        }
        if self.rom_size != 256 * KB && self.rom_size != 512 * KB {
            return Err(ConfigError::RamSize {
                what: "rom",
                size: self.rom_size,
            });
        }
        if self.drives.len() > 4 {
            return Err(ConfigError::Drives(self.drives.len()));
        }
        for spec in &self.extra_ram {
            let end = u64::from(spec.base) + u64::from(spec.size);
            let in_24bit = spec.base < 0x0100_0000;
            if spec.size == 0 || spec.base & 0xFFFF != 0 || end > 1 << 32 || in_24bit {
                return Err(ConfigError::Region {
                    base: spec.base,
                    size: spec.size,
                });
            }
        }
        let e = self.entries;
        if [e.trampoline, e.inflate, e.replay]
            .iter()
            .any(|&off| off >= self.code_size)
        {
            return Err(ConfigError::CodeSize(self.code_size));
        }
        Ok(())
    }

    #[cfg(feature = "native")]
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        #[derive(serde::Deserialize)]
        struct WithModel {
            model: Option<AmigaModel>,
        }
        let head: WithModel = serde_json::from_str(text)?;
        let config: Self = match head.model {
            Some(model) => {
                // Overlay the description onto the named preset.
                let mut merged = serde_json::to_value(Self::preset(model))?;
                let overrides: serde_json::Value = serde_json::from_str(text)?;
                if let (Some(dst), Some(src)) = (merged.as_object_mut(), overrides.as_object()) {
                    for (k, v) in src {
                        if k != "model" {
                            dst.insert(k.clone(), v.clone());
                        }
                    }
                }
                serde_json::from_value(merged)?
            }
            None => serde_json::from_str(text)?,
        };
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "native")]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("unsupported CPU {0}")]
    Cpu(u32),

    #[error("invalid {what} RAM size {size:#x}")]
    RamSize { what: &'static str, size: u32 },

    #[error("invalid RAM region {size:#x} bytes at {base:#010x}")]
    Region { base: u32, size: u32 },

    #[error("at most four floppy drives, got {0}")]
    Drives(usize),

    #[error("code segment of {0:#x} bytes does not hold the loader entry points")]
    CodeSize(u32),

    #[error("couldn't read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[cfg(feature = "native")]
    #[error("bad machine description: {0}")]
    Json(#[from] serde_json::Error),
}
