use std::sync::Arc;

use glam::Vec2;

use image_fmt::ChannelSelector;
use job_queue::JobQueue;
use lib::{BackgroundImagesLoader, Canvas, Error, Image, StatisticsCache};

mod report;
mod settings;

use settings::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let settings = match Settings::from_matches(&settings::app().get_matches()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = simple_logger::init_with_level(settings.log_level) {
        eprintln!("Could not initialize logging: {}", e);
    }

    match run(&settings) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            log::error!("{}", e);
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Returns whether every image loaded.
fn run(settings: &Settings) -> Result<bool, Error> {
    let job_queue = Arc::new(match settings.threads {
        Some(n) => JobQueue::with_threads(n),
        None => JobQueue::new(),
    });
    let selector = ChannelSelector::new(&settings.channels, settings.regex)?;

    //------
    // Load everything in the background, in command line order.
    let loader = BackgroundImagesLoader::new(Arc::clone(&job_queue));
    let reference_id = settings
        .reference
        .as_ref()
        .map(|path| loader.enqueue(path, selector.clone(), false));
    for (i, path) in settings.images.iter().enumerate() {
        loader.enqueue(path, selector.clone(), i == 0);
    }

    let mut all_loaded = true;
    let mut reference: Option<Arc<Image>> = None;
    let mut images: Vec<Arc<Image>> = Vec::new();
    let mut selected: Option<Arc<Image>> = None;
    for addition in loader.wait_all() {
        match addition.result {
            Ok(image) => {
                if Some(image.id()) == reference_id {
                    reference = Some(image);
                } else {
                    if addition.should_select {
                        selected = Some(Arc::clone(&image));
                    }
                    images.push(image);
                }
            }
            Err(e) => {
                eprintln!("{}: {}", addition.path.display(), e);
                all_loaded = false;
            }
        }
    }

    if settings.reference.is_some() && reference.is_none() {
        log::warn!("No reference image, showing images as they are");
    }

    //------
    // Report on each image through the canvas.
    let mut canvas = Canvas::new(
        Arc::clone(&job_queue),
        Arc::new(StatisticsCache::new()),
        settings.viewport,
    );
    canvas.set_display_params(settings.params)?;
    canvas.set_reference(reference.clone());
    if let Some(ref group) = settings.group {
        canvas.set_requested_channel_group(group);
    }

    for image in images.iter() {
        canvas.set_image(Some(Arc::clone(image)));
        canvas.fit_image_to_screen();

        let group = match canvas.channel_group() {
            Some(group) => group.clone(),
            None => continue,
        };
        if let Some(ref requested) = settings.group {
            if *requested != group.name {
                log::warn!(
                    "{} has no channel group \"{}\", showing \"{}\"",
                    image.short_name(),
                    requested,
                    group.name
                );
            }
        }

        println!("{}", report::image_summary(image));
        if let Some(ref reference) = reference {
            println!("Compared to {} ({})", reference.short_name(), settings.params.metric);
        }

        if let Some(task) = canvas.canvas_statistics() {
            let stats = task.wait()?;
            println!("{}", report::statistics(&group.name, &stats));
        }

        let channels: Vec<&str> = group.channels.iter().map(|c| c.as_str()).collect();
        for &pixel in settings.probes.iter() {
            // Probe the center of the pixel.
            let position = canvas.transform().display_coordinate_from_image_pixel(
                pixel.floor() + Vec2::splat(0.5),
                image.dimensions(),
            );
            match canvas.values_at_display_position(position, &channels) {
                Ok(values) => println!("{}", report::probe(pixel.floor(), &channels, &values)),
                Err(e) => eprintln!("Pixel ({}, {}): {}", pixel.x, pixel.y, e),
            }
        }
        println!();
    }

    //------
    // Export the selected image.
    if let Some(ref path) = settings.export {
        canvas.set_image(selected);
        canvas.save_image(path)?;
        println!("Saved {}", path.display());
    }

    for i in (0..job_queue.log_count()).rev() {
        let (message, level) = job_queue.get_log(i);
        log::debug!("{:?}: {}", level, message);
    }

    Ok(all_loaded)
}
