use std::process::ExitCode;

fn main() -> ExitCode {
    match langspan::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let langspan::LangspanError::IntakeRejected { report, .. } = &e {
                eprintln!();
                eprint!("{}", report);
            }
            ExitCode::FAILURE
        }
    }
}
