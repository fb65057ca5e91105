use std::{error::Error, env, fs::File, io::{self, BufRead}, path::Path, process};
use tracing::{error, warn};
use tracing_subscriber::{fmt, EnvFilter};
use w2v_trainer::{Model, Similarity};


// queries against a saved model, runnable independently from the trainer:
// the K most similar words to a given word,
// the K best answers to an analogy of three words.

const K: usize = 10;

fn main() {

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    if let Err(e) = run() {
        error!("{}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {

    // arguments to this executable should be:
    // a letter selector: "a" for analogies, "b" for word similarity
    // path to input based on selector (quads or singles)
    // path to a model, native (.w2v) or word2vec binary (.bin / .bin.gz)
    // example: ... a Input/analogies.txt outputs/word_vectors_s100_w5.w2v
    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        return Err("usage: query <a|b> <inputs.txt> <model>".into());
    }
    let selector = args[1].as_str();
    if !["a", "b"].contains(&selector) {
        return Err(format!("unrecognized pattern in first argument {}", selector).into());
    }

    let lines = io::BufReader::new(File::open(&args[2])?).lines().collect::<Result<Vec<String>, _>>()?;
    let model = load_model(&args[3])?;
    let similarity = model.similarity();

    match selector {
        "a" => {
            // each line holds quartets separated by spaces, e.g.
            // king queen man woman
            let inputs = lines.iter()
                .map(|line| line.split_whitespace().map(|x| x.to_string()).collect::<Vec<String>>())
                .filter(|quad| !quad.is_empty())
                .collect::<Vec<Vec<String>>>();
            run_analogies(&inputs, K, &similarity)
        },
        _ => {
            // one token per line
            let inputs = lines.iter()
                .map(|line| line.trim().to_string())
                .filter(|token| !token.is_empty())
                .collect::<Vec<String>>();
            run_similarity(&inputs, K, &similarity);
            Ok(())
        }
    }
}

fn load_model(path: &str) -> Result<Model, Box<dyn Error>> {
    let pretrained = path.ends_with(".bin") || path.ends_with(".bin.gz");
    let model = if pretrained {
        Model::load_pretrained_binary(Path::new(path))?
    } else {
        Model::load(Path::new(path))?
    };
    Ok(model)
}

fn run_analogies(inputs: &[Vec<String>], k: usize, similarity: &Similarity) -> Result<(), Box<dyn Error>> {

    // each element in inputs holds 4 strings, the object is to find the analogy
    // of the combination of the first 3, in hope that it would match the 4th.
    // a is to b as c is to ? translates to b - a + c : ?

    for input in inputs {

        if input.len() != 4 {
            return Err(format!("analogy line should hold 4 tokens, got {:?}", input).into());
        }

        let source = [input[0].as_str(), input[1].as_str(), input[2].as_str()];
        let target = input[3].as_str();

        let analogies = match similarity.analogy(source, k) {
            Ok(analogies) => analogies,
            Err(e) => {
                warn!("{}", e);
                continue
            }
        };

        let mut found_target = false;
        for (i, (analogy, score)) in analogies.iter().enumerate() {
            println!("{} : {} - {} + {} ? {} = {}", i, source[1], source[0], source[2], analogy, score);
            if analogy == target {
                found_target = true;
                println!("found target '{}' analogy in place {}", target, 1 + i);
            }
        }

        if !found_target {
            println!("target '{}' was not found within the first {} analogies", target, k);
        }

        println!();
    }
    Ok(())
}

fn run_similarity(inputs: &[String], k: usize, similarity: &Similarity) {

    // finding the k most similar words to each of the input tokens
    for token in inputs {

        println!("searching {} most similar words to {}", k, token);
        match similarity.most_similar(token, k) {
            Ok(similar) => {
                for (i, (similar_token, score)) in similar.iter().enumerate() {
                    println!("{} : {} ? {} = {}", i, token, similar_token, score);
                }
            },
            Err(e) => warn!("{}", e)
        }
        println!();
    }
}
