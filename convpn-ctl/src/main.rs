use exitcode::ExitCode;

use std::process;

use convpn_lib::command::{Command, Response};
use convpn_lib::socket;

mod cli;

// Avoid musl's default allocator due to degraded performance
// https://nickb.dev/blog/default-musl-allocator-considered-harmful-to-performance
#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    let args = cli::parse();

    let cmd: Command = args.command.into();
    let resp = match socket::process_cmd(&args.socket_path, &cmd) {
        Ok(resp) => resp,
        Err(e) => {
            eprintln!("Error processing command: {e}");
            process::exit(exitcode::UNAVAILABLE);
        }
    };

    if args.json { json_print(&resp) } else { pretty_print(&resp) };

    process::exit(determine_exitcode(&resp));
}

fn json_print(resp: &Response) {
    match serde_json::to_string_pretty(resp) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Error serializing response to JSON: {e}"),
    }
}

fn pretty_print(resp: &Response) {
    match resp {
        Response::Pong => println!("Pong"),
        Response::Connecting => println!("Connecting..."),
        Response::Disconnected => println!("Disconnected"),
        Response::FlagsUpdated => println!("Flags updated"),
        Response::Locations(names) => {
            for name in names {
                println!("{name}");
            }
        }
        Response::Error(msg) => eprintln!("Error: {msg}"),
        Response::Status(status) => {
            println!("State: {}", status.state);
            if let Some(location) = &status.location {
                println!("Location: {location}");
            }
            if let Some(uptime) = status.uptime_secs {
                println!("Uptime: {uptime}s");
            }
            if let Some(ip) = &status.expected_public_ip {
                println!("Public IP: {ip}");
            }
            if let Some(port) = &status.forwarded_port {
                println!("Forwarded port: {port}");
            }
            println!("Reconnections: {}", status.reconnections);
            println!("Route corrections: {}", status.corrections);
        }
    }
}

fn determine_exitcode(resp: &Response) -> ExitCode {
    match resp {
        Response::Pong => exitcode::OK,
        Response::Connecting => exitcode::OK,
        Response::Disconnected => exitcode::OK,
        Response::FlagsUpdated => exitcode::OK,
        Response::Locations(_) => exitcode::OK,
        Response::Status(_) => exitcode::OK,
        Response::Error(_) => exitcode::UNAVAILABLE,
    }
}
