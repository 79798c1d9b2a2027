//! Terminal color capability demo (hidden subcommand).

use anyhow::Result;
use console::{style, Color};
use std::process::ExitCode;

pub fn run() -> Result<ExitCode> {
    println!("{}", style("Basic colors").bold());
    let basics = [
        ("black", Color::Black),
        ("red", Color::Red),
        ("green", Color::Green),
        ("yellow", Color::Yellow),
        ("blue", Color::Blue),
        ("magenta", Color::Magenta),
        ("cyan", Color::Cyan),
        ("white", Color::White),
    ];
    for (name, color) in basics {
        print!("{} ", style(name).fg(color));
    }
    println!();
    for (name, color) in basics {
        print!("{} ", style(name).bg(color).black());
    }
    println!();
    println!();

    println!("{}", style("Attributes").bold());
    println!(
        "{} {} {} {} {}",
        style("bold").bold(),
        style("dim").dim(),
        style("italic").italic(),
        style("underlined").underlined(),
        style("reversed").reverse(),
    );
    println!();

    println!("{}", style("256-color cube").bold());
    for row in 0..6u16 {
        for column in 0..36u16 {
            let index = 16 + row * 36 + column;
            print!("{}", style("█").fg(Color::Color256(index as u8)));
        }
        println!();
    }

    Ok(ExitCode::SUCCESS)
}
