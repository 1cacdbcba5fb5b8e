fn main() {
    prompt_meter_lib::run()
}
