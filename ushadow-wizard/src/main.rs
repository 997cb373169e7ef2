const USAGE: &str = "\
Usage: ushadow-wizard [MODE]

Modes:
  --tui                 Interactive setup wizard (default)
  --tui-smoke[=PAGE]    Render one frame and exit
                        PAGE: home|quickstart|memory|chronicle|speaker|mobile|local|auth|reset
  --status              Print backend health, service status and setup level
  --watch               Follow queue and container events until Ctrl-C
  --start <service>     Start a backend service and wait until it runs
  --stop <service>      Stop a backend service
  --reset               Clear local wizard progress
  --print-config        Print the effective configuration (secrets masked)
  --help                Show this help

Configuration: USHADOW_WIZARD_CONFIG (TOML file) and USHADOW_* environment variables.";

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)
        .filter(|v| !v.starts_with("--"))
        .map(|v| v.to_string())
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return;
    }

    if args.iter().any(|a| a == "--print-config") {
        ushadow_wizard::print_config();
        return;
    }

    // Non-interactive TUI smoke test mode (for automated checks).
    // Renders a single frame for a specific page and exits 0.
    if let Some(arg) = args
        .iter()
        .find(|a| a.as_str() == "--tui-smoke" || a.starts_with("--tui-smoke="))
    {
        let target = arg
            .split_once('=')
            .map(|(_, v)| v.to_string())
            .filter(|v| !v.trim().is_empty());
        ushadow_wizard::run_tui_smoke(target);
        return;
    }

    if args.iter().any(|a| a == "--status") {
        ushadow_wizard::run_status();
        return;
    }

    if args.iter().any(|a| a == "--watch") {
        ushadow_wizard::run_watch();
        return;
    }

    if args.iter().any(|a| a == "--reset") {
        ushadow_wizard::run_reset();
        return;
    }

    for (flag, start) in [("--start", true), ("--stop", false)] {
        if args.iter().any(|a| a == flag) {
            match flag_value(&args, flag) {
                Some(name) => ushadow_wizard::run_service_action(&name, start),
                None => {
                    eprintln!("{} needs a service name\n\n{}", flag, USAGE);
                    std::process::exit(2);
                }
            }
            return;
        }
    }

    if let Some(unknown) = args.iter().find(|a| a.as_str() != "--tui") {
        eprintln!("Unknown argument: {}\n\n{}", unknown, USAGE);
        std::process::exit(2);
    }

    ushadow_wizard::run_tui();
}
