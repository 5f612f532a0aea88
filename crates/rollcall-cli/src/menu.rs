//! Interactive operator menu.
//!
//! A three-choice prompt loop on stdin. Workflow failures are printed and
//! the menu keeps running; only end-of-input or an explicit exit leaves
//! the loop.

use crate::commands;
use crate::config::Config;
use anyhow::Result;
use std::io::Write;

pub fn run(config: &Config) -> Result<()> {
    let stdin = std::io::stdin();

    loop {
        println!();
        println!("rollcall: what would you like to do?");
        println!("  1) capture a new reference photo");
        println!("  2) take attendance");
        println!("  3) exit");
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }

        match line.trim() {
            "1" => {
                print!("name for the new photo: ");
                std::io::stdout().flush()?;
                let mut name = String::new();
                if stdin.read_line(&mut name)? == 0 {
                    break;
                }
                if let Err(e) = commands::capture(config, name.trim()) {
                    eprintln!("error: {e:#}");
                }
            }
            "2" => {
                if let Err(e) = commands::attend(config, false) {
                    eprintln!("error: {e:#}");
                }
            }
            "3" | "q" | "quit" | "exit" => break,
            "" => {}
            other => println!("unrecognized choice: {other:?}"),
        }
    }

    println!("goodbye");
    Ok(())
}
