//! main
use std::env;
use std::io::{self, prelude::*, BufReader, Write};
use std::process;
use std::sync::Arc;

use log::{error, info};

use torrconf::settings::{BtSets, SettingsManager};
use torrconf::store::{self, Storage, Store};

fn help(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "help    -- show help")?;
    writeln!(out, "get     -- get value, by: <path> <name>")?;
    writeln!(out, "set     -- set value, by: <path> <name> <value>")?;
    writeln!(out, "ls      -- list keys, by: <path>")?;
    writeln!(out, "rm      -- remove value, by: <path> <name>")?;
    writeln!(out, "clear   -- remove all keys, by: <path>")?;
    writeln!(out, "show    -- show current settings")?;
    writeln!(out, "apply   -- replace settings, by: <json>")?;
    writeln!(out, "reset   -- reset settings to defaults")?;
    writeln!(out, "backups -- list recovered database files")?;
    writeln!(out, "exit    -- exit")?;
    Ok(())
}

fn process_db_command(out: &mut impl Write, store: &Store, cmds: &[&str]) -> io::Result<()> {
    match cmds {
        ["set", path, name, value] => store.set(path, name, value.as_bytes()),
        ["get", path, name] => {
            if let Some(v) = store.get(path, name) {
                out.write_all(&v)?;
                writeln!(out)?;
            }
        }
        ["ls", path] => {
            for key in store.list(path) {
                writeln!(out, "{key}")?;
            }
        }
        ["rm", path, name] => store.remove(path, name),
        ["clear", path] => store.clear(path),
        ["backups"] => match store.backups() {
            Ok(backups) => {
                for p in backups {
                    writeln!(out, "{}", p.display())?;
                }
            }
            Err(e) => writeln!(out, "error: {e}")?,
        },
        _ => writeln!(out, "bad arguments, see `help`")?,
    };

    Ok(())
}

fn process_settings_command(
    out: &mut impl Write,
    manager: &SettingsManager,
    cmd: &str,
    args: &str,
) -> io::Result<()> {
    match cmd {
        "show" => writeln!(out, "{}", manager.settings())?,
        "apply" => match BtSets::from_json(args.as_bytes()) {
            Ok(sets) => {
                manager.replace(sets);
                writeln!(out, "{}", manager.settings())?;
            }
            Err(e) => writeln!(out, "invalid settings: {e}")?,
        },
        "reset" => {
            manager.reset_defaults();
            writeln!(out, "{}", manager.settings())?;
        }
        _ => {}
    };

    Ok(())
}

fn run(manager: &SettingsManager, store: Option<&Store>) -> io::Result<()> {
    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());
    let mut out = io::stdout();

    loop {
        write!(out, "> ")?;
        out.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }

        let line = line.trim();
        let (cmd, args) = line.split_once(' ').unwrap_or((line, ""));

        match cmd {
            "exit" => break,
            "help" => help(&mut out)?,
            "show" | "apply" | "reset" => process_settings_command(&mut out, manager, cmd, args)?,
            "set" | "get" | "ls" | "rm" | "clear" | "backups" => match store {
                Some(store) => {
                    // the value of `set` may contain spaces.
                    let cmds: Vec<&str> = line.splitn(4, ' ').collect();
                    process_db_command(&mut out, store, &cmds)?;
                }
                None => writeln!(out, "config db is not open")?,
            },
            "" => {}
            _ => writeln!(out, "unknown command `{cmd}`, see `help`")?,
        };
    }

    Ok(())
}

fn main() -> io::Result<()> {
    // Init log config from env.
    env_logger::init();

    let mut read_only = false;
    let mut data_dir = None;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--read-only" => read_only = true,
            _ => data_dir = Some(arg),
        }
    }

    let Some(data_dir) = data_dir else {
        eprintln!("usage: torrconf [--read-only] <data-dir>");
        process::exit(2);
    };

    info!("Starting with data dir {data_dir}, read-only: {read_only}");

    let db = store::shared(&data_dir);
    if db.is_none() {
        error!("settings will not be saved in this run");
    }

    let manager = SettingsManager::new(
        db.clone().map(|s| s as Arc<dyn Storage>),
        read_only,
    );
    manager.load();

    // release the file lock on Ctrl-C.
    if let Err(e) = ctrlc::set_handler(|| {
        info!("ctrlc handle ...");
        store::close_shared();
        process::exit(130);
    }) {
        error!("Error setting Ctrl-C handler: {e}");
    }

    let res = run(&manager, db.as_deref());

    manager.wait_scan();
    store::close_shared();

    res
}
