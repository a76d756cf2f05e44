extern crate anyhow;

use ko_chatbot::pipelines::sentiment::Sentiment;
use ko_chatbot::styling::{classify_style, Style, Styler, ENDINGS};
use ko_chatbot::vocab::{special_tokens, Vocab, EOS_TOKEN, NEGATIVE_TOKEN, POSITIVE_TOKEN, SOS_TOKEN};
use std::collections::HashSet;
use std::convert::TryFrom;
use tch::Tensor;

fn vocab(words: &[&str]) -> anyhow::Result<Vocab> {
    let mut tokens = special_tokens();
    tokens.extend(words.iter().map(|word| word.to_string()));
    Ok(Vocab::from_tokens(tokens)?)
}

fn rows(tensor: &Tensor) -> anyhow::Result<Vec<Vec<i64>>> {
    let width = tensor.size()[1] as usize;
    let flat = Vec::<i64>::try_from(&tensor.reshape([-1]))?;
    Ok(flat.chunks(width).map(|row| row.to_vec()).collect())
}

fn padded(ids: Vec<i64>, width: usize, pad: i64) -> Vec<i64> {
    let mut ids = ids;
    ids.resize(width, pad);
    ids
}

#[test]
fn styling_injects_control_tokens() -> anyhow::Result<()> {
    let source_vocab = vocab(&["오늘", "시험", "잘", "봤어"])?;
    let target_vocab = vocab(&["정말", "축하합니다", "다행이야", "."])?;
    let max_len = 8;
    let styler = Styler::new(&source_vocab, &target_vocab, max_len)?;
    let source_pad = source_vocab.pad_index();
    let target_pad = target_vocab.pad_index();
    let sos = target_vocab.sos_index()?;
    let eos = target_vocab.eos_index()?;

    //    Raw batch: two rows, padded wider than max_len
    let width = 10;
    let enc_rows = vec![
        padded(source_vocab.tokens_to_ids(&["오늘", "시험", "잘", "봤어"]), width, source_pad),
        padded(source_vocab.tokens_to_ids(&["시험"]), width, source_pad),
    ];
    let dec_rows = vec![
        padded(
            vec![sos, target_vocab.token_to_id("정말"), target_vocab.token_to_id("축하합니다"), target_vocab.token_to_id("."), eos],
            width,
            target_pad,
        ),
        padded(vec![sos, target_vocab.token_to_id("다행이야"), eos], width, target_pad),
    ];
    let enc_input = Tensor::from_slice(&enc_rows.concat()).view([2, width as i64]);
    let dec_input = Tensor::from_slice(&dec_rows.concat()).view([2, width as i64]);
    let sentiment = Tensor::from_slice(&[1i64, 0]);

    let styled = styler.styling(&enc_input, &dec_input, &sentiment)?;
    assert_eq!(styled.enc_input.size(), vec![2, max_len as i64]);
    assert_eq!(styled.dec_input.size(), vec![2, max_len as i64]);
    assert_eq!(styled.dec_output.size(), vec![2, max_len as i64]);

    let enc = rows(&styled.enc_input)?;
    let dec_in = rows(&styled.dec_input)?;
    let dec_out = rows(&styled.dec_output)?;

    //    Sentiment token is the last real encoder token, rows keep their order
    let positive = source_vocab.special_token_id(POSITIVE_TOKEN)?;
    let negative = source_vocab.special_token_id(NEGATIVE_TOKEN)?;
    assert_eq!(&enc[0][..5], &[enc_rows[0][0], enc_rows[0][1], enc_rows[0][2], enc_rows[0][3], positive]);
    assert!(enc[0][5..].iter().all(|id| *id == source_pad));
    assert_eq!(&enc[1][..2], &[enc_rows[1][0], negative]);
    assert!(enc[1][2..].iter().all(|id| *id == source_pad));

    //    Style marker right after <sos>, labels shifted by one and ending with <eos>
    let formal_positive = styler.marker_id(Style::Formal, Sentiment::Positive);
    assert_eq!(target_vocab.id_to_token(formal_positive)?, "<formal_posi>");
    assert_eq!(&dec_in[0][..5], &[sos, formal_positive, dec_rows[0][1], dec_rows[0][2], dec_rows[0][3]]);
    assert_eq!(&dec_out[0][..5], &[formal_positive, dec_rows[0][1], dec_rows[0][2], dec_rows[0][3], eos]);
    assert!(dec_out[0][5..].iter().all(|id| *id == target_pad));

    let casual_negative = styler.marker_id(Style::Casual, Sentiment::Negative);
    assert_eq!(&dec_in[1][..3], &[sos, casual_negative, dec_rows[1][1]]);
    assert_eq!(&dec_out[1][..3], &[casual_negative, dec_rows[1][1], eos]);
    Ok(())
}

#[test]
fn styling_truncates_to_max_len() -> anyhow::Result<()> {
    let words = ["하나", "둘", "셋", "넷", "다섯"];
    let source_vocab = vocab(&words)?;
    let target_vocab = vocab(&words)?;
    let max_len = 4;
    let styler = Styler::new(&source_vocab, &target_vocab, max_len)?;
    let sos = target_vocab.sos_index()?;
    let eos = target_vocab.eos_index()?;

    let source = source_vocab.tokens_to_ids(&words);
    let mut target = vec![sos];
    target.extend(target_vocab.tokens_to_ids(&words));
    target.push(eos);

    let styled = styler.styling(
        &Tensor::from_slice(&source).view([1, 5]),
        &Tensor::from_slice(&target).view([1, 7]),
        &Tensor::from_slice(&[0i64]),
    )?;
    let enc = rows(&styled.enc_input)?;
    let dec_in = rows(&styled.dec_input)?;
    let dec_out = rows(&styled.dec_output)?;
    let marker = styler.marker_id(Style::Neutral, Sentiment::Negative);

    assert_eq!(enc[0], vec![source[0], source[1], source[2], source_vocab.special_token_id(NEGATIVE_TOKEN)?]);
    assert_eq!(dec_in[0], vec![sos, marker, target[1], target[2]]);
    assert_eq!(dec_out[0], vec![marker, target[1], target[2], target[3]]);
    assert!(!dec_out[0].contains(&eos));
    Ok(())
}

#[test]
fn styling_rejects_malformed_batches() -> anyhow::Result<()> {
    let source_vocab = vocab(&["안녕"])?;
    let target_vocab = vocab(&["안녕"])?;
    let styler = Styler::new(&source_vocab, &target_vocab, 4)?;
    let sos = target_vocab.special_token_id(SOS_TOKEN)?;
    let eos = target_vocab.special_token_id(EOS_TOKEN)?;

    let flat = Tensor::from_slice(&[5i64, 1, 1]);
    let dec_input = Tensor::from_slice(&[sos, eos, 1]).view([1, 3]);
    assert!(styler.styling(&flat, &dec_input, &Tensor::from_slice(&[1i64])).is_err());

    let enc_input = Tensor::from_slice(&[5i64, 1, 1]).view([1, 3]);
    assert!(styler
        .styling(&enc_input, &dec_input, &Tensor::from_slice(&[1i64, 0]))
        .is_err());
    assert!(styler
        .styling(&enc_input, &dec_input, &Tensor::from_slice(&[2i64]))
        .is_err());
    Ok(())
}

#[test]
fn ending_table_is_unambiguous() {
    let mut seen = HashSet::new();
    for (ending, _) in ENDINGS {
        assert!(seen.insert(*ending), "ending {} listed twice", ending);
    }
}

#[test]
fn style_classification() {
    assert_eq!(classify_style("만나서 반갑습니다."), Style::Formal);
    assert_eq!(classify_style("어서 오십시오"), Style::Formal);
    assert_eq!(classify_style("괜찮아요?"), Style::Polite);
    assert_eq!(classify_style("같이 가자~"), Style::Casual);
    assert_eq!(classify_style("응"), Style::Neutral);
    assert_eq!(classify_style(""), Style::Neutral);
    assert_eq!(classify_style("ㅋㅋㅋㅋ"), Style::Neutral);
}
