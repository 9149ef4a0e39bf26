use std::process;

fn main() {
    match mdpdf_cli::run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("mdpdf error: {err:#}");
            process::exit(1);
        }
    }
}
