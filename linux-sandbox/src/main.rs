fn main() {
    tau_linux_sandbox::run_main();
}
