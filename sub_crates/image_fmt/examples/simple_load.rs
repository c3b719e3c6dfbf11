fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).ok_or("usage: simple_load <image> [selector]")?;
    let selector = image_fmt::ChannelSelector::new(&std::env::args().nth(2).unwrap_or_default(), false)?;

    let (data, format) = image_fmt::load(&mut std::fs::File::open(path)?, &selector)?;

    println!("{} {}x{}", format, data.dimensions.0, data.dimensions.1);
    for chan in data.channels.iter() {
        let (lo, hi) = chan.min_max().unwrap_or((0.0, 0.0));
        println!("  {:<16} min {:<12} max {:<12} mean {}", chan.name(), lo, hi, chan.mean());
    }

    return Ok(());
}
