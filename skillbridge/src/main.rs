fn main() {
    if let Err(e) = skillbridge::run_cli() {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}
