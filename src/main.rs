use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let argv: Vec<String> = std::env::args().collect();

    let args = match tcpbridge::parse_args(&argv) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match tcpbridge::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
