/*++

Licensed under the Apache-2.0 license.

File Name:

   main.rs

Abstract:

    Main entry point for the secure certificate provisioning application.

--*/

use std::path::PathBuf;

use clap::{arg, value_parser, Command};

mod create;
mod espefuse;
mod esptool;

use secure_cert_types::Target;

/// Entry point
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let sub_cmds = vec![
        Command::new("create")
            .about("Create the secure certificate partition and provision the device")
            .arg(
                arg!(--"private-key" <FILE> "Device private key (PEM or DER), default client.key")
                    .required(false)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"password" <PASSWORD> "Password of the private key, if encrypted")
                    .required(false),
            )
            .arg(
                arg!(--"device-cert" <FILE> "Device certificate, default client.crt")
                    .required(false)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"ca-cert" <FILE> "CA certificate, used only if the file exists, default ca.crt")
                    .required(false)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"config" <FILE> "TOML file providing input paths; command line flags win")
                    .required(false)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                arg!(--"target-chip" <CHIP> "Target chip, e.g. esp32c3")
                    .required(false)
                    .default_value("esp32c3"),
            )
            .arg(arg!(--"configure-ds" "Provision the DS peripheral instead of storing the key as plaintext"))
            .arg(
                arg!(--"efuse-key-id" <ID> "eFuse key block that holds/will hold the wrapping key")
                    .required(false)
                    .value_parser(value_parser!(u32))
                    .default_value("1"),
            )
            .arg(
                arg!(-p --"port" <PORT> "UART port the device is connected to")
                    .required(false),
            )
            .arg(arg!(--"production" "Production configuration: keep the eFuse key block read protected"))
            .arg(arg!(--"keep-ds-data" "Keep the wrapping key and DS data on the host for testing"))
            .arg(arg!(--"skip-flash" "Generate the partition but do not flash it"))
            .arg(
                arg!(--"offset" <HEX> "Flash offset of the secure cert partition")
                    .required(false)
                    .default_value("0xD000"),
            )
            .arg(
                arg!(--"out" <FILE> "Output partition image")
                    .required(false)
                    .value_parser(value_parser!(PathBuf)),
            ),
        Command::new("summary")
            .about("Print the eFuse summary of the connected chip")
            .arg(
                arg!(--"target-chip" <CHIP> "Target chip, e.g. esp32c3")
                    .required(false)
                    .default_value("esp32c3"),
            )
            .arg(arg!(-p --"port" <PORT> "UART port the device is connected to").required(true)),
    ];

    let cmd = Command::new("secure-cert-app")
        .arg_required_else_help(true)
        .subcommands(sub_cmds)
        .about("Device PKI credential provisioning tools")
        .get_matches();

    let result = match cmd.subcommand().unwrap() {
        ("create", args) => create::run_cmd(args),
        ("summary", args) => summary(args),
        (_, _) => unreachable!(),
    };

    if let Err(err) = result {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}

fn summary(args: &clap::ArgMatches) -> anyhow::Result<()> {
    let target: Target = args
        .get_one::<String>("target-chip")
        .map(String::as_str)
        .unwrap_or_default()
        .parse()?;
    let port = args
        .get_one::<String>("port")
        .expect("port is a required arg");
    let tool = espefuse::EspefuseTool::new(target, port, &create::idf_path()?);
    tool.print_summary()?;
    Ok(())
}
