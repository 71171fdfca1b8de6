fn main() {
    if let Err(err) = book_ledger::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
