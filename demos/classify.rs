use std::env;

use imagenet_classify::labels::DEFAULT_CLASS_MAP;
use imagenet_classify::{load_image, ClassMap, ClassificationPipeline, Device, InputSpec};

fn main() {
    let model_path = env::args().nth(1).expect("no model path");
    let image_path = env::args().nth(2).expect("no image path");

    let image = load_image(image_path).unwrap();
    let labels = ClassMap::from_path(DEFAULT_CLASS_MAP).unwrap();
    let pipeline =
        ClassificationPipeline::new(model_path, InputSpec::imagenet(), Device::Cpu, labels)
            .unwrap();

    let top = pipeline.classify(&image).unwrap();
    println!("Result: {}", top.label);
    println!("Index: {}", top.index);
}
