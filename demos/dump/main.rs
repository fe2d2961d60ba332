#[macro_use]
extern crate log;

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Error};
use memmap::Mmap;
use structopt::StructOpt;

use btfparse::Type;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Format {
    Text,
    JSON,
    YAML,
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::JSON),
            "yaml" => Ok(Format::YAML),
            _ => bail!("unknown format: {}", s),
        }
    }
}

#[derive(StructOpt, Debug)]
#[structopt(name = "btfdump")]
struct Opt {
    /// Output format (text, json, yaml)
    #[structopt(short, long, default_value = "text")]
    format: Format,

    /// Output file
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// File to process
    #[structopt(name = "FILE", parse(from_os_str))]
    file: PathBuf,
}

const ANON: &str = "(anon)";

struct TextFmt<'a>(&'a Type);

impl<'a> fmt::Display for TextFmt<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Type::Void => writeln!(f, "VOID"),
            Type::Int {
                name,
                size,
                bits_offset,
                nr_bits,
                encoding,
            } => {
                writeln!(
                    f,
                    "INT '{}' size={} bits_offset={} nr_bits={} encoding={:?}",
                    name, size, bits_offset, nr_bits, encoding
                )
            }
            Type::Ptr { type_id } => writeln!(f, "PTR type_id={}", type_id),
            Type::Array {
                elem_type_id,
                index_type_id,
                nr_elems,
            } => {
                writeln!(
                    f,
                    "ARRAY elem_type_id={} index_type_id={} nr_elems={}",
                    elem_type_id, index_type_id, nr_elems
                )
            }
            Type::Struct {
                name,
                size,
                members,
            }
            | Type::Union {
                name,
                size,
                members,
            } => {
                writeln!(
                    f,
                    "{} '{}' size={} vlen={}",
                    if self.0.is_struct() { "STRUCT" } else { "UNION" },
                    name.as_deref().unwrap_or(ANON),
                    size,
                    members.len()
                )?;

                for m in members {
                    write!(
                        f,
                        "\t'{}' type_id={} bits_offset={}",
                        m.name.as_deref().unwrap_or(ANON),
                        m.type_id,
                        m.bits_offset
                    )?;

                    if m.bitfield_size != 0 {
                        write!(f, " bitfield_size={}", m.bitfield_size)?;
                    }

                    writeln!(f)?;
                }

                Ok(())
            }
            Type::Enum { name, size, values } => {
                writeln!(
                    f,
                    "ENUM '{}' size={} vlen={}",
                    name.as_deref().unwrap_or(ANON),
                    size,
                    values.len()
                )?;

                for v in values {
                    writeln!(f, "\t'{}' val={}", v.name, v.value)?;
                }

                Ok(())
            }
            Type::Fwd { name, is_union } => {
                writeln!(
                    f,
                    "FWD '{}' fwd_kind={}",
                    name,
                    if *is_union { "union" } else { "struct" }
                )
            }
            Type::Typedef { name, type_id } => {
                writeln!(f, "TYPEDEF '{}' type_id={}", name, type_id)
            }
            Type::Volatile { type_id } => writeln!(f, "VOLATILE type_id={}", type_id),
            Type::Const { type_id } => writeln!(f, "CONST type_id={}", type_id),
            Type::Func { name, type_id } => {
                writeln!(f, "FUNC '{}' type_id={}", name, type_id)
            }
            Type::FuncProto {
                ret_type_id,
                params,
                variadic,
            } => {
                writeln!(
                    f,
                    "FUNC_PROTO ret_type_id={} vlen={}",
                    ret_type_id,
                    params.len()
                )?;

                for p in params {
                    writeln!(
                        f,
                        "\t'{}' type_id={}",
                        p.name.as_deref().unwrap_or(ANON),
                        p.type_id
                    )?;
                }

                if *variadic {
                    writeln!(f, "\t'...'")?;
                }

                Ok(())
            }
        }
    }
}

fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    debug!("opts: {:?}", &opt);

    let mut w = if let Some(path) = opt.output {
        either::Left(File::create(path)?)
    } else {
        either::Right(io::stdout().lock())
    };

    let f = File::open(&opt.file)?;
    let mm = unsafe { Mmap::map(&f)? };

    let btf = btfparse::parse(&mm).context("parse BTF file")?;

    for (idx, ty) in btf.iter().enumerate() {
        match opt.format {
            Format::Text => {
                write!(&mut w, "[{}] {}", idx + 1, TextFmt(ty))?;
            }
            Format::JSON => {
                serde_json::to_writer(&mut w, ty)?;
                writeln!(&mut w)?;
            }
            Format::YAML => {
                serde_yaml::to_writer(&mut w, ty)?;
            }
        }
    }

    Ok(())
}
