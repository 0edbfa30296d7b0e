//! Export-table symbol index
//!
//! Parses the PE/ELF images backing the native modules loaded in the host
//! process using goblin and builds a per-module, address-sorted function
//! table for nearest-preceding-symbol lookup.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};

use super::{NativeSymbol, NativeSymbolIndex};

/// A native module the index knows about
#[derive(Debug, Clone)]
pub struct LoadedModule {
    /// Module name (file stem)
    pub name: String,
    /// Base address the module is mapped at in the process
    pub base_address: u64,
    /// Size of the mapped image in bytes
    pub image_size: u64,
    /// Exported/named functions, sorted by address (module-relative)
    functions: Vec<ModuleFunction>,
}

#[derive(Debug, Clone)]
struct ModuleFunction {
    name: String,
    /// Address relative to the module base
    rva: u64,
    /// Size in bytes (0 if unknown)
    size: u64,
}

impl LoadedModule {
    /// Parse a module image from disk and record its mapped base address.
    pub fn from_file<P: AsRef<Path>>(path: P, base_address: u64) -> Result<Self> {
        let name = path
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let data = fs::read(&path)?;
        Self::from_bytes(&data, name, base_address)
    }

    /// Parse a module image from bytes.
    pub fn from_bytes(data: &[u8], name: String, base_address: u64) -> Result<Self> {
        if data.len() < 4 {
            return Err(anyhow!("File too small"));
        }

        // PE (MZ header)
        if data[0] == 0x4D && data[1] == 0x5A {
            return Self::parse_pe(data, name, base_address);
        }

        // ELF
        if data.len() > 4 && data[0..4] == [0x7F, b'E', b'L', b'F'] {
            return Self::parse_elf(data, name, base_address);
        }

        Err(anyhow!("Unknown binary format"))
    }

    fn parse_pe(data: &[u8], name: String, base_address: u64) -> Result<Self> {
        let pe = goblin::pe::PE::parse(data)?;

        let image_size = pe
            .header
            .optional_header
            .map(|oh| u64::from(oh.windows_fields.size_of_image))
            .unwrap_or(0);

        let mut functions = Vec::new();
        for export in &pe.exports {
            if let Some(export_name) = &export.name {
                functions.push(ModuleFunction {
                    name: export_name.to_string(),
                    rva: export.rva as u64,
                    size: 0,
                });
            }
        }

        functions.sort_by_key(|f| f.rva);
        Ok(Self {
            name,
            base_address,
            image_size,
            functions,
        })
    }

    fn parse_elf(data: &[u8], name: String, base_address: u64) -> Result<Self> {
        let elf = goblin::elf::Elf::parse(data)?;

        // Mapped extent of the image, from the PT_LOAD segments
        let load_min = elf
            .program_headers
            .iter()
            .filter(|ph| ph.p_type == goblin::elf::program_header::PT_LOAD)
            .map(|ph| ph.p_vaddr)
            .min()
            .unwrap_or(0);
        let load_max = elf
            .program_headers
            .iter()
            .filter(|ph| ph.p_type == goblin::elf::program_header::PT_LOAD)
            .map(|ph| ph.p_vaddr + ph.p_memsz)
            .max()
            .unwrap_or(0);
        let image_size = load_max.saturating_sub(load_min);

        let mut functions = Vec::new();
        for sym in &elf.syms {
            if sym.st_type() == goblin::elf::sym::STT_FUNC && sym.st_value != 0 {
                if let Some(sym_name) = elf.strtab.get_at(sym.st_name) {
                    if !sym_name.is_empty() {
                        functions.push(ModuleFunction {
                            name: sym_name.to_string(),
                            rva: sym.st_value - load_min,
                            size: sym.st_size,
                        });
                    }
                }
            }
        }
        for sym in &elf.dynsyms {
            if sym.st_type() == goblin::elf::sym::STT_FUNC && sym.st_value != 0 {
                if let Some(sym_name) = elf.dynstrtab.get_at(sym.st_name) {
                    let rva = sym.st_value - load_min;
                    if !sym_name.is_empty() && !functions.iter().any(|f| f.rva == rva) {
                        functions.push(ModuleFunction {
                            name: sym_name.to_string(),
                            rva,
                            size: sym.st_size,
                        });
                    }
                }
            }
        }

        functions.sort_by_key(|f| f.rva);
        Ok(Self {
            name,
            base_address,
            image_size,
            functions,
        })
    }

    fn contains(&self, address: u64) -> bool {
        address >= self.base_address && address < self.base_address + self.image_size
    }

    /// Nearest named function at or before `address`.
    fn function_before(&self, address: u64) -> Option<(&ModuleFunction, u64)> {
        let rva = address.checked_sub(self.base_address)?;
        let idx = self.functions.partition_point(|f| f.rva <= rva);
        let func = self.functions.get(idx.checked_sub(1)?)?;
        let displacement = rva - func.rva;
        // Respect the symbol size when the image records one
        if func.size > 0 && displacement >= func.size {
            return None;
        }
        Some((func, displacement))
    }
}

/// [`NativeSymbolIndex`] over the export tables of a set of loaded modules
#[derive(Debug, Default)]
pub struct ExportSymbolIndex {
    modules: Vec<LoadedModule>,
}

impl ExportSymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from `(path, base_address)` pairs, skipping modules
    /// that fail to parse.
    pub fn from_module_list<P: AsRef<Path>>(modules: &[(P, u64)]) -> Self {
        let mut index = Self::new();
        for (path, base) in modules {
            match LoadedModule::from_file(path, *base) {
                Ok(module) => index.add_module(module),
                Err(e) => {
                    log::warn!(
                        "Skipping native module {}: {}",
                        path.as_ref().display(),
                        e
                    );
                }
            }
        }
        index
    }

    pub fn add_module(&mut self, module: LoadedModule) {
        log::debug!(
            "Indexed native module {} at {:#x} ({} functions)",
            module.name,
            module.base_address,
            module.functions.len()
        );
        self.modules.push(module);
    }
}

impl NativeSymbolIndex for ExportSymbolIndex {
    fn resolve(&self, address: u64) -> Option<NativeSymbol> {
        let module = self.modules.iter().find(|m| m.contains(address))?;
        let (func, displacement) = module.function_before(address)?;
        Some(NativeSymbol {
            module: module.name.clone(),
            method_name: func.name.clone(),
            displacement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_module() -> LoadedModule {
        LoadedModule {
            name: "libtest".into(),
            base_address: 0x7f00_0000_0000,
            image_size: 0x10000,
            functions: vec![
                ModuleFunction { name: "alpha".into(), rva: 0x1000, size: 0x40 },
                ModuleFunction { name: "beta".into(), rva: 0x2000, size: 0 },
            ],
        }
    }

    #[test]
    fn resolves_exact_and_offset_addresses() {
        let mut index = ExportSymbolIndex::new();
        index.add_module(test_module());

        let sym = index.resolve(0x7f00_0000_1000).unwrap();
        assert_eq!(sym.method_name, "alpha");
        assert_eq!(sym.displacement, 0);

        let sym = index.resolve(0x7f00_0000_1010).unwrap();
        assert_eq!(sym.method_name, "alpha");
        assert_eq!(sym.displacement, 0x10);
    }

    #[test]
    fn respects_symbol_size_when_known() {
        let mut index = ExportSymbolIndex::new();
        index.add_module(test_module());

        // 0x1040 is past the end of alpha (size 0x40) and before beta
        assert!(index.resolve(0x7f00_0000_1040).is_none());

        // beta has unknown size, so any following address resolves to it
        let sym = index.resolve(0x7f00_0000_2f00).unwrap();
        assert_eq!(sym.method_name, "beta");
    }

    #[test]
    fn ignores_addresses_outside_all_modules() {
        let mut index = ExportSymbolIndex::new();
        index.add_module(test_module());

        assert!(index.resolve(0x1000).is_none());
        assert!(index.resolve(0x7f00_0001_0000).is_none());
    }

    #[test]
    fn from_module_list_skips_unparsable_modules() {
        let exe_path = std::env::current_exe().unwrap();
        let index = ExportSymbolIndex::from_module_list(&[
            (std::path::PathBuf::from("/nonexistent/libmissing.so"), 0x1000),
            (exe_path, 0x40_0000),
        ]);

        // The missing module contributes nothing
        assert!(index.resolve(0x1000).is_none());
        // The real image indexed at the given base, if its exports parsed
        assert_eq!(
            index.modules.iter().filter(|m| m.base_address == 0x1000).count(),
            0
        );
    }

    #[test]
    fn parses_own_executable_if_readable() {
        // Best-effort smoke test over a real image
        let exe_path = std::env::current_exe().unwrap();
        match LoadedModule::from_file(&exe_path, 0x40_0000) {
            Ok(module) => {
                assert_eq!(module.base_address, 0x40_0000);
                assert!(module.image_size > 0);
            }
            Err(e) => println!("Could not parse self: {e:?}"),
        }
    }
}
