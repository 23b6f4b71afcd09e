//! ELF32 ARM executable loader.
//!
//! Grounded on `vm_open_program`/`vm_check_elf32bitarm`/
//! `vm_load_sections_elf32bitarm`/`vm_read_instruction` in `vm.c`: validate
//! the header (32-bit, little-endian, `EM_ARM`, `ET_EXEC`), load every
//! `SHF_ALLOC`+`SHT_PROGBITS` section into memory, and index `SHT_SYMTAB`
//! symbols by both address and name. Where the original shells out to
//! `libelf`/`gelf`, this reads the ELF32 header and section table by hand
//! with `byteorder`, in the style of the teacher's `formats/elf.rs`.

use std::collections::HashMap;
use std::io::{Cursor, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use super::ProgramImage;
use crate::error::{DecompilerError, Result};
use crate::types::Address;

const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_ARM: u16 = 40;
const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHF_ALLOC: u32 = 0x2;
const EHDR_SIZE: usize = 52;

struct LoadedSection {
    vaddr: Address,
    data: Vec<u8>,
}

struct RawShdr {
    #[allow(dead_code)]
    name: u32,
    ty: u32,
    flags: u32,
    addr: u32,
    offset: u32,
    size: u32,
    link: u32,
    entsize: u32,
}

/// A parsed ELF32 ARM executable: the loaded `PROGBITS` sections and the
/// symbol table, read once and kept immutable for the life of the run.
pub struct ElfImage {
    entry: Address,
    sections: Vec<LoadedSection>,
    symbols_by_addr: HashMap<Address, String>,
    symbols_by_name: HashMap<String, Address>,
}

impl ElfImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < EHDR_SIZE || &bytes[0..4] != b"\x7fELF" {
            return Err(DecompilerError::ElfParseError {
                message: "missing ELF magic".into(),
            });
        }
        if bytes[EI_CLASS] != ELFCLASS32 {
            return Err(DecompilerError::ElfParseError {
                message: "not a 32-bit architecture".into(),
            });
        }
        if bytes[EI_DATA] != ELFDATA2LSB {
            return Err(DecompilerError::ElfParseError {
                message: "not little-endian".into(),
            });
        }

        let mut cur = Cursor::new(bytes);
        cur.seek(SeekFrom::Start(16))?;
        let e_type = cur.read_u16::<LittleEndian>()?;
        let e_machine = cur.read_u16::<LittleEndian>()?;
        let _e_version = cur.read_u32::<LittleEndian>()?;
        let e_entry = cur.read_u32::<LittleEndian>()?;
        let _e_phoff = cur.read_u32::<LittleEndian>()?;
        let e_shoff = cur.read_u32::<LittleEndian>()?;
        let _e_flags = cur.read_u32::<LittleEndian>()?;
        let _e_ehsize = cur.read_u16::<LittleEndian>()?;
        let _e_phentsize = cur.read_u16::<LittleEndian>()?;
        let _e_phnum = cur.read_u16::<LittleEndian>()?;
        let e_shentsize = cur.read_u16::<LittleEndian>()?;
        let e_shnum = cur.read_u16::<LittleEndian>()?;
        let _e_shstrndx = cur.read_u16::<LittleEndian>()?;

        if e_type != ET_EXEC {
            return Err(DecompilerError::ElfParseError {
                message: "not an executable file".into(),
            });
        }
        if e_machine != EM_ARM {
            return Err(DecompilerError::ElfParseError {
                message: format!("not ARM architecture (e_machine = {e_machine})"),
            });
        }

        let mut shdrs = Vec::with_capacity(e_shnum as usize);
        for i in 0..e_shnum {
            let base = e_shoff as u64 + u64::from(i) * e_shentsize as u64;
            cur.seek(SeekFrom::Start(base))?;
            shdrs.push(RawShdr {
                name: cur.read_u32::<LittleEndian>()?,
                ty: cur.read_u32::<LittleEndian>()?,
                flags: cur.read_u32::<LittleEndian>()?,
                addr: cur.read_u32::<LittleEndian>()?,
                offset: cur.read_u32::<LittleEndian>()?,
                size: cur.read_u32::<LittleEndian>()?,
                link: cur.read_u32::<LittleEndian>()?,
                entsize: {
                    let _sh_info = cur.read_u32::<LittleEndian>()?;
                    let _sh_addralign = cur.read_u32::<LittleEndian>()?;
                    cur.read_u32::<LittleEndian>()?
                },
            });
        }

        let mut sections = Vec::new();
        let mut symbols_by_addr = HashMap::new();
        let mut symbols_by_name = HashMap::new();

        for shdr in &shdrs {
            if shdr.flags & SHF_ALLOC != 0 && shdr.ty == SHT_PROGBITS {
                let start = shdr.offset as usize;
                let end = start + shdr.size as usize;
                let data = bytes
                    .get(start..end)
                    .ok_or_else(|| DecompilerError::ElfParseError {
                        message: "section data out of file bounds".into(),
                    })?
                    .to_vec();
                sections.push(LoadedSection {
                    vaddr: shdr.addr,
                    data,
                });
            }

            if shdr.ty == SHT_SYMTAB && shdr.entsize > 0 {
                let strtab = shdrs
                    .get(shdr.link as usize)
                    .ok_or_else(|| DecompilerError::ElfParseError {
                        message: "symtab sh_link out of range".into(),
                    })?;
                let strtab_data = bytes
                    .get(strtab.offset as usize..(strtab.offset + strtab.size) as usize)
                    .ok_or_else(|| DecompilerError::ElfParseError {
                        message: "string table out of file bounds".into(),
                    })?;

                let count = shdr.size / shdr.entsize;
                for i in 0..count {
                    let base = shdr.offset as u64 + u64::from(i) * shdr.entsize as u64;
                    cur.seek(SeekFrom::Start(base))?;
                    let st_name = cur.read_u32::<LittleEndian>()?;
                    let st_value = cur.read_u32::<LittleEndian>()?;
                    let _st_size = cur.read_u32::<LittleEndian>()?;
                    let _st_info = cur.read_u8()?;
                    let _st_other = cur.read_u8()?;
                    let _st_shndx = cur.read_u16::<LittleEndian>()?;

                    if st_name == 0 {
                        continue;
                    }
                    if let Some(name) = read_c_str(strtab_data, st_name as usize) {
                        symbols_by_addr.insert(st_value, name.clone());
                        symbols_by_name.insert(name, st_value);
                    }
                }
            }
        }

        Ok(ElfImage {
            entry: e_entry,
            sections,
            symbols_by_addr,
            symbols_by_name,
        })
    }
}

fn read_c_str(data: &[u8], offset: usize) -> Option<String> {
    let tail = data.get(offset..)?;
    let end = tail.iter().position(|&b| b == 0)?;
    String::from_utf8(tail[..end].to_vec()).ok()
}

impl ProgramImage for ElfImage {
    fn read_instruction(&self, addr: Address) -> Result<u32> {
        for section in &self.sections {
            let size = section.data.len() as u32;
            if addr >= section.vaddr && addr < section.vaddr + size {
                let off = (addr - section.vaddr) as usize;
                let word = section
                    .data
                    .get(off..off + 4)
                    .ok_or(DecompilerError::FatalMemory { addr })?;
                return Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
            }
        }
        Err(DecompilerError::FatalMemory { addr })
    }

    fn entry_point(&self) -> Address {
        self.entry
    }

    fn symbol_name(&self, addr: Address) -> Option<&str> {
        self.symbols_by_addr.get(&addr).map(String::as_str)
    }

    fn symbol_address(&self, name: &str) -> Option<Address> {
        self.symbols_by_name.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a minimal ELF32 ARM ET_EXEC with one loaded PROGBITS section
    /// and one named symbol, for exercising the loader without a real
    /// toolchain-produced binary.
    fn build_fixture(entry: u32, code: &[u8]) -> Vec<u8> {
        let vaddr = 0x8000u32;
        let code_off = EHDR_SIZE as u32;
        let code_len = code.len() as u32;

        let strtab: &[u8] = b"\0main\0";
        let strtab_off = code_off + code_len;
        let strtab_len = strtab.len() as u32;

        let symtab_off = strtab_off + strtab_len;
        // One null symbol + one real symbol, 16 bytes each.
        let symtab_len = 32u32;

        let shoff = symtab_off + symtab_len;
        // Sections: 0 = null, 1 = .text (PROGBITS, ALLOC), 2 = .strtab, 3 = .symtab
        let shnum: u16 = 4;
        let shentsize: u16 = 40;

        let mut buf = vec![0u8; (shoff + u32::from(shnum) * u32::from(shentsize)) as usize];

        buf[0..4].copy_from_slice(b"\x7fELF");
        buf[EI_CLASS] = ELFCLASS32;
        buf[EI_DATA] = ELFDATA2LSB;

        let mut w = |off: usize, v: u32| buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
        let mut w16 = |off: usize, v: u16| buf[off..off + 2].copy_from_slice(&v.to_le_bytes());

        w16(16, ET_EXEC);
        w16(18, EM_ARM);
        w(20, 1); // e_version
        w(24, entry);
        w(28, 0); // e_phoff
        w(32, shoff);
        w(36, 0); // e_flags
        w16(40, EHDR_SIZE as u16);
        w16(42, 0);
        w16(44, 0);
        w16(46, shentsize);
        w16(48, shnum);
        w16(50, 0);

        buf[code_off as usize..(code_off + code_len) as usize].copy_from_slice(code);
        buf[strtab_off as usize..(strtab_off + strtab_len) as usize].copy_from_slice(strtab);

        // Symbol 1: name offset 1 ("main"), value = entry.
        let sym1 = symtab_off as usize + 16;
        buf[sym1..sym1 + 4].copy_from_slice(&1u32.to_le_bytes());
        buf[sym1 + 4..sym1 + 8].copy_from_slice(&entry.to_le_bytes());

        let shdr = |buf: &mut Vec<u8>, idx: u32, name: u32, ty: u32, flags: u32, addr: u32,
                    offset: u32, size: u32, link: u32, entsize: u32| {
            let base = shoff as usize + (idx as usize) * 40;
            buf[base..base + 4].copy_from_slice(&name.to_le_bytes());
            buf[base + 4..base + 8].copy_from_slice(&ty.to_le_bytes());
            buf[base + 8..base + 12].copy_from_slice(&flags.to_le_bytes());
            buf[base + 12..base + 16].copy_from_slice(&addr.to_le_bytes());
            buf[base + 16..base + 20].copy_from_slice(&offset.to_le_bytes());
            buf[base + 20..base + 24].copy_from_slice(&size.to_le_bytes());
            buf[base + 24..base + 28].copy_from_slice(&link.to_le_bytes());
            buf[base + 32..base + 36].copy_from_slice(&0u32.to_le_bytes());
            buf[base + 36..base + 40].copy_from_slice(&entsize.to_le_bytes());
        };

        shdr(&mut buf, 1, 0, SHT_PROGBITS, SHF_ALLOC, vaddr, code_off, code_len, 0, 0);
        shdr(&mut buf, 2, 0, 3 /* SHT_STRTAB */, 0, 0, strtab_off, strtab_len, 0, 0);
        shdr(&mut buf, 3, 0, SHT_SYMTAB, 0, 0, symtab_off, symtab_len, 2, 16);

        buf
    }

    #[test]
    fn parses_entry_point_and_loads_code_section() {
        let code = [0x1e, 0xff, 0x2f, 0xe1]; // bx lr, little-endian
        let bytes = build_fixture(0x8000, &code);
        let image = ElfImage::parse(&bytes).unwrap();
        assert_eq!(image.entry_point(), 0x8000);
        assert_eq!(image.read_instruction(0x8000).unwrap(), 0xE12F_FF1E);
    }

    #[test]
    fn resolves_symbols_both_ways() {
        let code = [0x1e, 0xff, 0x2f, 0xe1];
        let bytes = build_fixture(0x8000, &code);
        let image = ElfImage::parse(&bytes).unwrap();
        assert_eq!(image.symbol_name(0x8000), Some("main"));
        assert_eq!(image.symbol_address("main"), Some(0x8000));
    }

    #[test]
    fn read_outside_sections_is_fatal_memory() {
        let code = [0x1e, 0xff, 0x2f, 0xe1];
        let bytes = build_fixture(0x8000, &code);
        let image = ElfImage::parse(&bytes).unwrap();
        assert!(matches!(
            image.read_instruction(0xDEAD_0000),
            Err(DecompilerError::FatalMemory { addr: 0xDEAD_0000 })
        ));
    }

    #[test]
    fn rejects_non_elf_input() {
        assert!(ElfImage::parse(b"not an elf").is_err());
    }

    #[test]
    fn rejects_wrong_machine() {
        let code = [0x1e, 0xff, 0x2f, 0xe1];
        let mut bytes = build_fixture(0x8000, &code);
        bytes[18..20].copy_from_slice(&3u16.to_le_bytes()); // EM_386
        assert!(ElfImage::parse(&bytes).is_err());
    }

    #[test]
    fn opens_a_real_file_from_disk() {
        use std::io::Write;

        let code = [0x1e, 0xff, 0x2f, 0xe1];
        let bytes = build_fixture(0x8000, &code);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();

        let image = ElfImage::open(file.path()).unwrap();
        pretty_assertions::assert_eq!(image.entry_point(), 0x8000);
        assert_eq!(image.read_instruction(0x8000).unwrap(), 0xE12F_FF1E);
    }
}
