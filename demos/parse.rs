use std::io::Read;

use mecab_rs::Tagger;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let text = if args.is_empty() {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        input
    } else {
        args.join(" ")
    };

    let tagger = Tagger::new()?;
    println!("charset: {}", tagger.charset());
    for dictionary in tagger.dictionaries()? {
        println!(
            "dictionary: {} ({:?}, {} entries)",
            dictionary.filename, dictionary.dictionary_type, dictionary.size
        );
    }

    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        for node in tagger.parse(line)? {
            println!("{}\t{}", node.text(), node.feature());
        }
        println!("EOS");
    }

    Ok(())
}
