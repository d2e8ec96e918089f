fn main() {
    stoptrack_lib::run()
}
