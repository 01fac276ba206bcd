use crate::command::{self, Command, DEFAULT_FILE_SIZE, HELP};
use anyhow::Context;
use blockfs::io::BlockStorage;
use blockfs::FileSystem;
use log::debug;
use std::io::{BufRead, Write};

#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Interactive front end driving a `FileSystem` one command line at a time.
pub struct Shell<T: BlockStorage> {
    fs: FileSystem<T>,
}

impl<T: BlockStorage> Shell<T> {
    pub fn new(fs: FileSystem<T>) -> Self {
        Shell { fs }
    }

    pub fn into_fs(self) -> FileSystem<T> {
        self.fs
    }

    /// Reads commands until `exit` or end of input. Failed commands are
    /// reported on `err` and do not stop the loop.
    pub fn run<R: BufRead, W: Write, E: Write>(
        &mut self,
        mut input: R,
        out: &mut W,
        err: &mut E,
    ) -> anyhow::Result<()> {
        writeln!(out, "Welcome to the blockfs shell!")?;
        writeln!(out, "Type 'help' to see available commands.")?;

        let mut raw = Vec::new();
        loop {
            write!(out, "> ")?;
            out.flush()?;
            raw.clear();
            if input
                .read_until(b'\n', &mut raw)
                .context("failed to read command")?
                == 0
            {
                break;
            }
            // Bytes that are not UTF-8 become replacement characters.
            let line = String::from_utf8_lossy(&raw);

            let outcome = command::parse(&line)
                .map_err(anyhow::Error::from)
                .and_then(|cmd| self.execute(cmd, out));
            match outcome {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(e) => writeln!(err, "Error: {:#}", e)?,
            }
        }
        Ok(())
    }

    pub fn execute<W: Write>(&mut self, cmd: Command, out: &mut W) -> anyhow::Result<Flow> {
        debug!("executing {:?}", cmd);
        match cmd {
            Command::Nothing => {}
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Exit => {
                writeln!(out, "Exiting CLI. Goodbye!")?;
                return Ok(Flow::Exit);
            }
            Command::CreateFile {
                path,
                size,
                defaulted,
            } => {
                if defaulted {
                    writeln!(out, "Default file size is {}.", DEFAULT_FILE_SIZE)?;
                }
                self.fs.create_file(&path, size)?;
                writeln!(out, "Created file {} ({} bytes)", path, size)?;
            }
            Command::CreateDir { path } => {
                self.fs.create_directory(&path)?;
                writeln!(out, "Created directory {}", path)?;
            }
            Command::DeleteFile { path } => {
                self.fs.delete_file(&path)?;
                writeln!(out, "Deleted file {}", path)?;
            }
            Command::DeleteDir { path, recursive } => {
                self.fs.delete_directory(&path, recursive)?;
                writeln!(out, "Deleted directory {}", path)?;
            }
            Command::WriteFile { path, data, append } => {
                self.fs.write_file(&path, data.as_bytes(), append)?;
                writeln!(out, "Wrote {} bytes to {}", data.len(), path)?;
            }
            Command::ReadFile { path } => {
                let content = self.fs.read_file(&path)?;
                writeln!(out, "Contents of {}:", path)?;
                writeln!(out, "{}", String::from_utf8_lossy(&content))?;
            }
            Command::List { path } => {
                let names = self.fs.list_directory(&path)?;
                writeln!(out, "Contents of {}:", path)?;
                for name in names {
                    writeln!(out, "  {}", name)?;
                }
            }
            Command::Stat { path } => {
                let entry = self
                    .fs
                    .get_metadata(&path)
                    .with_context(|| format!("no such file or directory: {}", path))?;
                let kind = if entry.is_dir() { "directory" } else { "file" };
                writeln!(out, "{}: {}", entry.path, kind)?;
                writeln!(out, "  size:   {}", entry.size)?;
                writeln!(out, "  blocks: {:?}", entry.blocks)?;
            }
            Command::MoveFile { src, dst } => {
                self.fs.move_file(&src, &dst)?;
                writeln!(out, "Moved {} to {}", src, dst)?;
            }
            Command::MoveDir { src, dst } => {
                self.fs.move_directory(&src, &dst)?;
                writeln!(out, "Moved {} to {}", src, dst)?;
            }
            Command::Rename { path, name } => {
                self.fs.rename_path(&path, &name)?;
                writeln!(out, "Renamed {} to {}", path, name)?;
            }
        }
        Ok(Flow::Continue)
    }
}
