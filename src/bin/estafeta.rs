use estafeta::cli;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match cli::run(args) {
        Ok(run) => {
            println!("{}", run.output);
            std::process::exit(run.exit_code);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    }
}
