use thiserror::Error;

/// Size used by `create_file` when none is given.
pub const DEFAULT_FILE_SIZE: usize = 100;
/// Sizes at or above this are refused by `create_file`.
pub const SIZE_LIMIT: usize = 1_048_576;

pub const HELP: &str = "\
Available commands:
  create_file [path] [size]
  create_dir [path]
  delete_file [path]
  delete_dir [path] [recursive]
  write_file [path] [data] [append]
  read_file [path]
  list [path]
  stat [path]
  move_file [source] [destination]
  move_dir [source] [destination]
  rename [path] [new-name]
  exit";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    CreateFile {
        path: String,
        size: usize,
        /// No size was given and the default applies.
        defaulted: bool,
    },
    CreateDir {
        path: String,
    },
    DeleteFile {
        path: String,
    },
    DeleteDir {
        path: String,
        recursive: bool,
    },
    WriteFile {
        path: String,
        data: String,
        append: bool,
    },
    ReadFile {
        path: String,
    },
    List {
        path: String,
    },
    Stat {
        path: String,
    },
    MoveFile {
        src: String,
        dst: String,
    },
    MoveDir {
        src: String,
        dst: String,
    },
    Rename {
        path: String,
        name: String,
    },
    Exit,
    /// A blank line.
    Nothing,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}'. Type 'help' for a list of commands")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid size: '{0}'. Please provide a valid number")]
    InvalidSize(String),
    #[error("file size must be a positive number")]
    NonPositiveSize,
    #[error("file size is too large. Please provide a number between 1 and {}", SIZE_LIMIT)]
    SizeTooLarge,
}

/// Splits off the first whitespace delimited word.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

fn required(word: &str, usage: &'static str) -> Result<String, CommandError> {
    if word.is_empty() {
        Err(CommandError::Usage(usage))
    } else {
        Ok(word.to_string())
    }
}

pub fn parse(line: &str) -> Result<Command, CommandError> {
    let (name, rest) = split_word(line);
    let mut args = rest.split_whitespace();
    let mut next = || args.next().unwrap_or("");

    let cmd = match name {
        "" => Command::Nothing,
        "help" => Command::Help,
        "exit" => Command::Exit,
        "create_file" => {
            let path = required(next(), "create_file [path] [size]")?;
            let size = next();
            if size.is_empty() {
                Command::CreateFile {
                    path,
                    size: DEFAULT_FILE_SIZE,
                    defaulted: true,
                }
            } else {
                Command::CreateFile {
                    path,
                    size: parse_size(size)?,
                    defaulted: false,
                }
            }
        }
        "create_dir" => Command::CreateDir {
            path: required(next(), "create_dir [path]")?,
        },
        "delete_file" => {
            let path = required(next(), "delete_file [path]")?;
            let path = if path.starts_with('/') {
                path
            } else {
                format!("/{}", path)
            };
            Command::DeleteFile { path }
        }
        "delete_dir" => {
            let path = required(next(), "delete_dir [path] [recursive]")?;
            Command::DeleteDir {
                path,
                recursive: next() != "false",
            }
        }
        "write_file" => {
            let (path, data) = split_word(rest);
            let path = required(path, "write_file [path] [data] [append]")?;
            let (data, append) = parse_payload(data);
            Command::WriteFile { path, data, append }
        }
        "read_file" => Command::ReadFile {
            path: required(next(), "read_file [path]")?,
        },
        "list" => {
            let path = next();
            Command::List {
                path: if path.is_empty() { "/" } else { path }.to_string(),
            }
        }
        "stat" => Command::Stat {
            path: required(next(), "stat [path]")?,
        },
        "move_file" => Command::MoveFile {
            src: required(next(), "move_file [source] [destination]")?,
            dst: required(next(), "move_file [source] [destination]")?,
        },
        "move_dir" => Command::MoveDir {
            src: required(next(), "move_dir [source] [destination]")?,
            dst: required(next(), "move_dir [source] [destination]")?,
        },
        "rename" => Command::Rename {
            path: required(next(), "rename [path] [new-name]")?,
            name: required(next(), "rename [path] [new-name]")?,
        },
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(cmd)
}

fn parse_size(raw: &str) -> Result<usize, CommandError> {
    if raw.starts_with('-') {
        return Err(CommandError::NonPositiveSize);
    }
    if !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(CommandError::InvalidSize(raw.to_string()));
    }
    let size: usize = raw
        .parse()
        .map_err(|_| CommandError::SizeTooLarge)?;
    if size >= SIZE_LIMIT {
        return Err(CommandError::SizeTooLarge);
    }
    if size == 0 {
        return Err(CommandError::NonPositiveSize);
    }
    Ok(size)
}

/// Splits a write payload into data and the append flag. A trailing `true` or
/// `false` word is the flag (append when absent); data wrapped in double quotes
/// is unquoted.
fn parse_payload(raw: &str) -> (String, bool) {
    let mut data = raw.trim();
    let mut append = true;
    if let Some(i) = data.rfind(char::is_whitespace) {
        match &data[i + 1..] {
            "true" => {
                append = true;
                data = data[..i].trim_end();
            }
            "false" => {
                append = false;
                data = data[..i].trim_end();
            }
            _ => {}
        }
    }
    if data.len() >= 2 && data.starts_with('"') && data.ends_with('"') {
        data = &data[1..data.len() - 1];
    }
    (data.to_string(), append)
}
