fn main() {
    daemonize::cli::run()
}
