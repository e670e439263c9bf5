use castellan::cli;

fn main() {
    std::process::exit(cli::run());
}
